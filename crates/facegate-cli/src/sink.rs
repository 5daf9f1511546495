use facegate_core::{PresentationSink, SessionToken, VerificationResult, VerifyError};
use tokio::sync::mpsc;

/// Reports progress through `tracing` (stderr) and forwards display-name
/// requests to the command loop, which prompts for (or supplies) the name.
pub struct TerminalSink {
    names: Option<mpsc::UnboundedSender<SessionToken>>,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self { names: None }
    }

    /// Sink plus the receiver for display-name requests.
    pub fn with_name_requests() -> (Self, mpsc::UnboundedReceiver<SessionToken>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { names: Some(tx) }, rx)
    }
}

impl PresentationSink for TerminalSink {
    fn status(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn error(&self, error: &VerifyError) {
        tracing::error!(kind = error.kind(), "{error}");
    }

    fn loading(&self, active: bool) {
        tracing::trace!(active, "loading");
    }

    fn capture_enabled(&self, enabled: bool) {
        if !enabled {
            tracing::warn!("camera unavailable, capture disabled");
        }
    }

    fn request_display_name(&self, token: SessionToken) {
        match &self.names {
            Some(tx) => {
                if tx.send(token).is_err() {
                    tracing::warn!(%token, "display-name request dropped");
                }
            }
            None => tracing::warn!(%token, "display name requested but no prompt is attached"),
        }
    }

    fn finished(&self, result: &VerificationResult) {
        tracing::info!(success = result.is_success(), "session finished");
    }

    fn emotion_recorded(&self, emotion: &str) {
        tracing::info!(emotion, "emotion recorded");
    }

    fn user_list_changed(&self) {
        tracing::debug!("user list changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_requests_are_forwarded() {
        let (sink, mut rx) = TerminalSink::with_name_requests();
        sink.request_display_name(SessionToken::NONE);
        assert_eq!(rx.try_recv().unwrap(), SessionToken::NONE);
    }

    #[test]
    fn requests_without_prompt_are_ignored() {
        TerminalSink::new().request_display_name(SessionToken::NONE);
    }
}
