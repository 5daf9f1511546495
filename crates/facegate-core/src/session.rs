//! Per-attempt session state and the generation counter that supersedes it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::backend::IdentityMatch;
use crate::frame::EncodedImage;

/// Opaque per-attempt identifier. A response is applied only while its
/// token is still the issuer's current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionToken(u64);

impl SessionToken {
    /// The token that precedes any issued session.
    pub const NONE: SessionToken = SessionToken(0);
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Issues monotonically increasing session tokens. Issuing a new token
/// invalidates every earlier one.
#[derive(Debug, Clone, Default)]
pub struct TokenIssuer {
    current: Arc<AtomicU64>,
}

impl TokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> SessionToken {
        SessionToken(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> SessionToken {
        SessionToken(self.current.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, token: SessionToken) -> bool {
        token != SessionToken::NONE && self.current() == token
    }

    /// Invalidate the current token without starting a new session.
    pub fn revoke(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }
}

/// What the identity check said about the captured face.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentityStatus {
    #[default]
    Unknown,
    NewUser,
    Existing { label: String },
}

impl IdentityStatus {
    /// `None` until the identity check has answered.
    pub fn is_new_user(&self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::NewUser => Some(true),
            Self::Existing { .. } => Some(false),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Existing { label } => Some(label),
            _ => None,
        }
    }
}

impl From<IdentityMatch> for IdentityStatus {
    fn from(m: IdentityMatch) -> Self {
        if m.exists {
            Self::Existing {
                label: m.username.unwrap_or_default(),
            }
        } else {
            Self::NewUser
        }
    }
}

/// One attempt at verification.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub token: SessionToken,
    /// Liveness ticks sent so far.
    pub attempt_count: u32,
    pub identity: IdentityStatus,
    pub pending_image: Option<EncodedImage>,
    pub last_openness: Option<f32>,
}

impl CaptureSession {
    pub fn new(token: SessionToken) -> Self {
        Self {
            token,
            attempt_count: 0,
            identity: IdentityStatus::Unknown,
            pending_image: None,
            last_openness: None,
        }
    }

    pub fn reset_attempts(&mut self) {
        self.attempt_count = 0;
        self.last_openness = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuing_supersedes_previous_token() {
        let issuer = TokenIssuer::new();
        let first = issuer.issue();
        assert!(issuer.is_current(first));

        let second = issuer.issue();
        assert!(second > first);
        assert!(!issuer.is_current(first));
        assert!(issuer.is_current(second));
    }

    #[test]
    fn clones_share_the_generation() {
        let issuer = TokenIssuer::new();
        let observer = issuer.clone();
        let token = issuer.issue();
        assert!(observer.is_current(token));

        issuer.revoke();
        assert!(!observer.is_current(token));
    }

    #[test]
    fn none_token_is_never_current() {
        let issuer = TokenIssuer::new();
        assert!(!issuer.is_current(SessionToken::NONE));
    }

    #[test]
    fn identity_status_from_match() {
        let status: IdentityStatus = IdentityMatch {
            exists: true,
            username: Some("bob".into()),
        }
        .into();
        assert_eq!(status.is_new_user(), Some(false));
        assert_eq!(status.label(), Some("bob"));

        let status: IdentityStatus = IdentityMatch {
            exists: false,
            username: None,
        }
        .into();
        assert_eq!(status.is_new_user(), Some(true));
        assert_eq!(status.label(), None);
        assert_eq!(IdentityStatus::Unknown.is_new_user(), None);
    }

    #[test]
    fn reset_clears_liveness_progress() {
        let mut session = CaptureSession::new(SessionToken(3));
        session.attempt_count = 2;
        session.last_openness = Some(0.3);
        session.reset_attempts();
        assert_eq!(session.attempt_count, 0);
        assert_eq!(session.last_openness, None);
        assert_eq!(session.token.to_string(), "s3");
    }
}
