//! Presentation sink: where the core reports progress, errors and results.
//!
//! The core never touches a UI directly. Front ends implement
//! [`PresentationSink`]; everything except `status` and `error` has a
//! no-op default.

use std::sync::Mutex;

use crate::error::VerifyError;
use crate::orchestrator::VerificationResult;
use crate::session::SessionToken;

pub trait PresentationSink: Send + Sync {
    /// Human-readable progress message.
    fn status(&self, message: &str);

    fn error(&self, error: &VerifyError);

    fn loading(&self, _active: bool) {}

    /// Capture initiation was disabled (camera lost) or re-enabled.
    fn capture_enabled(&self, _enabled: bool) {}

    /// The session needs a display name before it can register.
    fn request_display_name(&self, _token: SessionToken) {}

    fn finished(&self, _result: &VerificationResult) {}

    fn emotion_recorded(&self, _emotion: &str) {}

    /// The user directory changed and any listing should be refreshed.
    fn user_list_changed(&self) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn status(&self, _message: &str) {}
    fn error(&self, _error: &VerifyError) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Status(String),
    Error(VerifyError),
    Loading(bool),
    CaptureEnabled(bool),
    DisplayNameRequested(SessionToken),
    Finished(VerificationResult),
    EmotionRecorded(String),
    UserListChanged,
}

/// Keeps every event in order, for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&SinkEvent) -> bool) -> usize {
        self.lock().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: SinkEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SinkEvent>> {
        // A panic while recording leaves the Vec intact.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PresentationSink for RecordingSink {
    fn status(&self, message: &str) {
        self.push(SinkEvent::Status(message.to_string()));
    }

    fn error(&self, error: &VerifyError) {
        self.push(SinkEvent::Error(error.clone()));
    }

    fn loading(&self, active: bool) {
        self.push(SinkEvent::Loading(active));
    }

    fn capture_enabled(&self, enabled: bool) {
        self.push(SinkEvent::CaptureEnabled(enabled));
    }

    fn request_display_name(&self, token: SessionToken) {
        self.push(SinkEvent::DisplayNameRequested(token));
    }

    fn finished(&self, result: &VerificationResult) {
        self.push(SinkEvent::Finished(result.clone()));
    }

    fn emotion_recorded(&self, emotion: &str) {
        self.push(SinkEvent::EmotionRecorded(emotion.to_string()));
    }

    fn user_list_changed(&self) {
        self.push(SinkEvent::UserListChanged);
    }
}
