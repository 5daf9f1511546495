use serde::Serialize;
use thiserror::Error;

use crate::backend::BackendError;
use crate::frame::CameraError;

/// Terminal failure of a verification or emotion-capture attempt.
///
/// Every variant ends the current session; none is retried by the core.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum VerifyError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("frame capture failed: {0}")]
    FrameCapture(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("no blink detected after {attempts} attempts")]
    LivenessTimeout { attempts: u32 },
    #[error("invalid input: {0}")]
    Validation(String),
}

impl VerifyError {
    /// Short stable name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CameraUnavailable(_) => "camera_unavailable",
            Self::FrameCapture(_) => "frame_capture",
            Self::Network(_) => "network",
            Self::Server(_) => "server",
            Self::LivenessTimeout { .. } => "liveness_timeout",
            Self::Validation(_) => "validation",
        }
    }
}

impl From<CameraError> for VerifyError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::Unavailable(msg) => Self::CameraUnavailable(msg),
            other => Self::FrameCapture(other.to_string()),
        }
    }
}

impl From<BackendError> for VerifyError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Network(msg) => Self::Network(msg),
            BackendError::Server(msg) => Self::Server(msg),
            BackendError::InvalidResponse(msg) => Self::Server(format!("invalid response: {msg}")),
        }
    }
}
