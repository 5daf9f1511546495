//! `reqwest` implementation of the recognition contract.

use std::time::Duration;

use async_trait::async_trait;
use facegate_core::{
    ActionSample, BackendError, EmotionRecord, EncodedImage, IdentityMatch, LoginGrant,
    RecognitionBackend,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::directory::{EmotionHistory, UserEntry};
use crate::envelope::{decode_response, payload};

/// Default TCP connect timeout. Requests have no overall timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct CheckFaceResponse {
    exists: bool,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectActionResponse {
    #[serde(default)]
    detected: Option<bool>,
    #[serde(default)]
    ear: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    username: String,
    #[serde(default)]
    redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmotionResponse {
    emotion: String,
}

/// HTTP client for one recognition service.
///
/// Keeps a cookie store, so the session cookie set by `/login` or
/// `/register` is sent with later emotion and analytics requests.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        Self::with_connect_timeout(base_url, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(
        base_url: &str,
        connect_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Full user directory.
    pub async fn user_list(&self) -> Result<Vec<UserEntry>, BackendError> {
        let value = self.get("/get_user_list", &[]).await?;
        payload(value, "user list")
    }

    /// Users whose name contains `query`.
    pub async fn search_users(&self, query: &str) -> Result<Vec<UserEntry>, BackendError> {
        let value = self.get("/search_users", &[("query", query.to_string())]).await?;
        payload(value, "user search")
    }

    /// Emotion history of the signed-in user over the last `days` days.
    pub async fn emotion_history(&self, days: u32) -> Result<EmotionHistory, BackendError> {
        let value = self
            .get("/get_emotion_history", &[("days", days.to_string())])
            .await?;
        payload(value, "emotion history")
    }

    /// End the server-side session.
    pub async fn logout(&self) -> Result<(), BackendError> {
        let url = self.endpoint("/logout");
        tracing::debug!(url = %url, "POST");
        let response = self.http.post(&url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Server(format!("HTTP {}", status.as_u16())));
        }
        Ok(())
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, BackendError> {
        let url = self.endpoint(path);
        tracing::debug!(url = %url, "POST");
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        read(response).await
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, BackendError> {
        let url = self.endpoint(path);
        tracing::debug!(url = %url, "GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        read(response).await
    }
}

async fn read(response: reqwest::Response) -> Result<Value, BackendError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(transport_error)?;
    let result = decode_response(status, &body);
    if let Err(e) = &result {
        tracing::debug!(status, error = %e, "request failed");
    }
    result
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Network(format!("request timed out: {e}"))
    } else if e.is_connect() {
        BackendError::Network(format!("connection failed: {e}"))
    } else if e.is_decode() {
        BackendError::InvalidResponse(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

fn image_body(image: &EncodedImage) -> Value {
    json!({ "image": image.as_str() })
}

fn action_sample(value: Value) -> Result<ActionSample, BackendError> {
    let response: DetectActionResponse = payload(value, "detect_action")?;
    match (response.detected, response.ear) {
        (Some(detected), _) => Ok(ActionSample::Detected(detected)),
        (None, Some(ear)) => Ok(ActionSample::Openness(ear)),
        (None, None) => Err(BackendError::InvalidResponse(
            "detect_action: neither `detected` nor `ear` present".into(),
        )),
    }
}

#[async_trait]
impl RecognitionBackend for HttpBackend {
    async fn check_identity(&self, image: &EncodedImage) -> Result<IdentityMatch, BackendError> {
        let value = self.post("/check_face", image_body(image)).await?;
        let response: CheckFaceResponse = payload(value, "check_face")?;
        Ok(IdentityMatch {
            exists: response.exists,
            username: response.username,
        })
    }

    async fn detect_action(&self, image: &EncodedImage) -> Result<ActionSample, BackendError> {
        let value = self.post("/detect_action", image_body(image)).await?;
        action_sample(value)
    }

    async fn register(
        &self,
        image: &EncodedImage,
        username: &str,
    ) -> Result<String, BackendError> {
        let body = json!({ "image": image.as_str(), "username": username });
        let value = self.post("/register", body).await?;
        let response: RegisterResponse = payload(value, "register")?;
        Ok(response.username.unwrap_or_else(|| username.to_string()))
    }

    async fn login(&self, image: &EncodedImage) -> Result<LoginGrant, BackendError> {
        let value = self.post("/login", image_body(image)).await?;
        let response: LoginResponse = payload(value, "login")?;
        Ok(LoginGrant {
            username: response.username,
            redirect: response.redirect,
        })
    }

    async fn record_emotion(&self, image: &EncodedImage) -> Result<EmotionRecord, BackendError> {
        let value = self.post("/record_emotion", image_body(image)).await?;
        let response: EmotionResponse = payload(value, "record_emotion")?;
        Ok(EmotionRecord {
            emotion: response.emotion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_cleanly() {
        let backend = HttpBackend::new("http://127.0.0.1:5000/").unwrap();
        assert_eq!(backend.base_url(), "http://127.0.0.1:5000");
        assert_eq!(
            backend.endpoint("/check_face"),
            "http://127.0.0.1:5000/check_face"
        );
        assert_eq!(backend.endpoint("login"), "http://127.0.0.1:5000/login");
    }

    #[test]
    fn boolean_detection_wins_over_metric() {
        let sample = action_sample(json!({"detected": true, "ear": 0.4})).unwrap();
        assert_eq!(sample, ActionSample::Detected(true));
    }

    #[test]
    fn metric_only_response_is_openness() {
        let sample = action_sample(json!({"ear": 0.17})).unwrap();
        assert_eq!(sample, ActionSample::Openness(0.17));
    }

    #[test]
    fn empty_detection_response_is_invalid() {
        assert!(matches!(
            action_sample(json!({"message": "no landmarks"})),
            Err(BackendError::InvalidResponse(_))
        ));
    }

    #[test]
    fn image_body_carries_data_uri() {
        let image = EncodedImage::from_data_uri("data:image/jpeg;base64,AAAA");
        assert_eq!(
            image_body(&image),
            json!({"image": "data:image/jpeg;base64,AAAA"})
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_network_failure() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let backend =
            HttpBackend::with_connect_timeout("http://127.0.0.1:9", Duration::from_millis(500))
                .unwrap();
        let image = EncodedImage::from_data_uri("data:image/jpeg;base64,AAAA");
        let err = backend.check_identity(&image).await.unwrap_err();
        assert!(matches!(err, BackendError::Network(_)));
    }
}
