//! facegate-client: HTTP/JSON client for the recognition service.
//!
//! [`HttpBackend`] implements [`facegate_core::RecognitionBackend`] over the
//! `/check_face`, `/detect_action`, `/register`, `/login` and
//! `/record_emotion` endpoints, and additionally exposes the directory and
//! analytics endpoints used by dashboards.

pub mod directory;
mod envelope;
pub mod http;

pub use directory::{EmotionDataset, EmotionHistory, EmotionStats, UserEntry};
pub use http::HttpBackend;
