//! facegate-core: camera capture, blink liveness and the verification
//! state machine that drives a face login / registration session.
//!
//! The face matching, emotion classification and eye-openness computation
//! all live behind [`RecognitionBackend`]; this crate only sequences calls
//! to it, enforces the liveness retry budget and discards responses that
//! belong to a superseded session.

pub mod backend;
pub mod capture;
pub mod emotion;
pub mod error;
pub mod frame;
pub mod liveness;
pub mod orchestrator;
pub mod session;
pub mod sink;

pub use backend::{
    ActionSample, BackendError, EmotionRecord, IdentityMatch, LoginGrant, RecognitionBackend,
    RecognitionClient, Tagged,
};
pub use capture::{CameraDevice, CaptureSource, SharedCapture, StreamHandle};
pub use emotion::EmotionCaptureFlow;
pub use error::VerifyError;
pub use frame::{CameraError, EncodedImage, RawFrame};
pub use liveness::{
    BlinkDetector, HysteresisRule, LivenessChallenge, LivenessConfig, LivenessOutcome,
    LivenessState,
};
pub use orchestrator::{
    spawn_orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorHandle,
    OrchestratorSnapshot, Phase, VerificationResult,
};
pub use session::{CaptureSession, IdentityStatus, SessionToken, TokenIssuer};
pub use sink::{NullSink, PresentationSink, RecordingSink, SinkEvent};
