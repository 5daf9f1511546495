//! Contract with the remote recognition service.
//!
//! Face matching, blink/openness detection and emotion classification are
//! opaque to this crate. [`RecognitionBackend`] is the seam: the HTTP
//! client implements it for production, tests script it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::frame::EncodedImage;
use crate::session::SessionToken;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Transport-level failure: the request never produced a response.
    #[error("network failure: {0}")]
    Network(String),
    /// The service answered with a non-success envelope.
    #[error("server error: {0}")]
    Server(String),
    /// The service answered with something that does not fit the contract.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Outcome of an identity lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityMatch {
    pub exists: bool,
    pub username: Option<String>,
}

/// One liveness observation. Backends either decide "blink detected"
/// themselves or return the raw eye-openness metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionSample {
    Detected(bool),
    Openness(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginGrant {
    pub username: String,
    pub redirect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionRecord {
    pub emotion: String,
}

#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Does the face in `image` belong to a known identity?
    async fn check_identity(&self, image: &EncodedImage) -> Result<IdentityMatch, BackendError>;

    /// One liveness tick.
    async fn detect_action(&self, image: &EncodedImage) -> Result<ActionSample, BackendError>;

    /// Create a new identity; returns the registered username.
    async fn register(&self, image: &EncodedImage, username: &str)
        -> Result<String, BackendError>;

    async fn login(&self, image: &EncodedImage) -> Result<LoginGrant, BackendError>;

    async fn record_emotion(&self, image: &EncodedImage) -> Result<EmotionRecord, BackendError>;
}

#[async_trait]
impl<B: RecognitionBackend + ?Sized> RecognitionBackend for Arc<B> {
    async fn check_identity(&self, image: &EncodedImage) -> Result<IdentityMatch, BackendError> {
        (**self).check_identity(image).await
    }

    async fn detect_action(&self, image: &EncodedImage) -> Result<ActionSample, BackendError> {
        (**self).detect_action(image).await
    }

    async fn register(
        &self,
        image: &EncodedImage,
        username: &str,
    ) -> Result<String, BackendError> {
        (**self).register(image, username).await
    }

    async fn login(&self, image: &EncodedImage) -> Result<LoginGrant, BackendError> {
        (**self).login(image).await
    }

    async fn record_emotion(&self, image: &EncodedImage) -> Result<EmotionRecord, BackendError> {
        (**self).record_emotion(image).await
    }
}

/// A response paired with the session token its request was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    pub token: SessionToken,
    pub value: T,
}

/// Token-tagging wrapper around a [`RecognitionBackend`].
///
/// The client itself keeps no session state: it stamps each response with
/// the token the caller passed in, and the orchestrator decides whether
/// that token is still current when the response arrives.
pub struct RecognitionClient<B: ?Sized> {
    backend: Arc<B>,
}

impl<B: ?Sized> Clone for RecognitionClient<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: RecognitionBackend + ?Sized> RecognitionClient<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn check_identity(
        &self,
        token: SessionToken,
        image: &EncodedImage,
    ) -> Tagged<Result<IdentityMatch, BackendError>> {
        tracing::debug!(%token, "check_identity request");
        let value = self.backend.check_identity(image).await;
        Tagged { token, value }
    }

    pub async fn detect_action(
        &self,
        token: SessionToken,
        image: &EncodedImage,
    ) -> Tagged<Result<ActionSample, BackendError>> {
        let value = self.backend.detect_action(image).await;
        Tagged { token, value }
    }

    pub async fn register(
        &self,
        token: SessionToken,
        image: &EncodedImage,
        username: &str,
    ) -> Tagged<Result<String, BackendError>> {
        tracing::debug!(%token, username, "register request");
        let value = self.backend.register(image, username).await;
        Tagged { token, value }
    }

    pub async fn login(
        &self,
        token: SessionToken,
        image: &EncodedImage,
    ) -> Tagged<Result<LoginGrant, BackendError>> {
        tracing::debug!(%token, "login request");
        let value = self.backend.login(image).await;
        Tagged { token, value }
    }
}
