//! One-shot emotion capture: snapshot, record, refresh the directory.

use std::sync::Arc;

use crate::backend::RecognitionBackend;
use crate::capture::{CameraDevice, SharedCapture};
use crate::error::VerifyError;
use crate::sink::PresentationSink;

/// Submits a single frame to the emotion-recording endpoint.
///
/// No retry budget: one failure ends the invocation and is reported to the
/// caller. Shares the [`CaptureSource`](crate::CaptureSource) with the
/// orchestrator, so only one camera stream is ever open.
pub struct EmotionCaptureFlow<D: CameraDevice, B: ?Sized, S: ?Sized> {
    capture: SharedCapture<D>,
    backend: Arc<B>,
    sink: Arc<S>,
}

impl<D, B, S> EmotionCaptureFlow<D, B, S>
where
    D: CameraDevice,
    B: RecognitionBackend + ?Sized,
    S: PresentationSink + ?Sized,
{
    pub fn new(capture: SharedCapture<D>, backend: Arc<B>, sink: Arc<S>) -> Self {
        Self {
            capture,
            backend,
            sink,
        }
    }

    /// Capture one frame and record the detected emotion. Returns the label.
    pub async fn capture(&self) -> Result<String, VerifyError> {
        self.sink.loading(true);
        self.sink.status("Analysing emotion...");

        let result = self.record().await;
        self.sink.loading(false);

        match &result {
            Ok(emotion) => {
                tracing::info!(emotion = %emotion, "emotion recorded");
                self.sink.user_list_changed();
                self.sink.emotion_recorded(emotion);
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "emotion capture failed");
                self.sink.error(e);
            }
        }
        result
    }

    async fn record(&self) -> Result<String, VerifyError> {
        let image = {
            let mut capture = self.capture.lock().await;
            capture.open()?;
            capture.snapshot()?
        };
        let record = self.backend.record_emotion(&image).await?;
        Ok(record.emotion)
    }
}
