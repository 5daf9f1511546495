//! Status-envelope decoding.
//!
//! The service is not consistent about how it wraps results. All of these
//! occur and are accepted:
//!
//! - `{"status": "success", "data": {...}}` / `{"status": "error", "message": ".."}`
//! - `{"success": true, ...fields}` / `{"success": false, "message": ".."}`
//! - bare objects or arrays with no envelope at all (treated as success)
//!
//! When a success envelope carries a non-null `data` member, that member is
//! the payload; otherwise the whole object is.

use facegate_core::BackendError;
use serde::de::DeserializeOwned;
use serde_json::Value;

const FALLBACK_MESSAGE: &str = "request failed";

/// Turn an HTTP status and body into the success payload.
pub(crate) fn decode_response(status: u16, body: &str) -> Result<Value, BackendError> {
    let success = (200..300).contains(&status);
    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            let payload = open_envelope(value)?;
            if success {
                Ok(payload)
            } else {
                Err(BackendError::Server(format!("HTTP {status}")))
            }
        }
        Err(_) if success => Err(BackendError::InvalidResponse(
            "response body is not JSON".into(),
        )),
        Err(_) => Err(BackendError::Server(format!("HTTP {status}"))),
    }
}

/// Strip the envelope, or report the failure it describes.
pub(crate) fn open_envelope(value: Value) -> Result<Value, BackendError> {
    match value {
        Value::Array(_) => Ok(value),
        Value::Object(mut map) => {
            let succeeded = match (map.get("status"), map.get("success")) {
                (Some(Value::String(status)), _) => status.eq_ignore_ascii_case("success"),
                (_, Some(Value::Bool(flag))) => *flag,
                _ => true,
            };

            if !succeeded {
                let message = ["message", "error"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .filter(|m| !m.is_empty())
                    .unwrap_or(FALLBACK_MESSAGE);
                return Err(BackendError::Server(message.to_string()));
            }

            match map.remove("data") {
                Some(data) if !data.is_null() => Ok(data),
                _ => Ok(Value::Object(map)),
            }
        }
        other => Err(BackendError::InvalidResponse(format!(
            "expected a JSON object or array, got {other}"
        ))),
    }
}

/// Deserialize a payload into `T`.
pub(crate) fn payload<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, BackendError> {
    serde_json::from_value(value)
        .map_err(|e| BackendError::InvalidResponse(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_envelope_unwraps_data() {
        let payload = open_envelope(json!({"status": "success", "data": {"emotion": "happy"}}));
        assert_eq!(payload.unwrap(), json!({"emotion": "happy"}));
    }

    #[test]
    fn status_envelope_without_data_keeps_fields() {
        let payload = open_envelope(json!({"status": "success", "emotion": "sad"})).unwrap();
        assert_eq!(payload["emotion"], "sad");
    }

    #[test]
    fn status_error_is_server_error() {
        let err = open_envelope(json!({"status": "error", "message": "no face"})).unwrap_err();
        assert_eq!(err, BackendError::Server("no face".into()));
    }

    #[test]
    fn success_flag_false_is_server_error() {
        let err = open_envelope(json!({"success": false, "message": "similar user exists"}))
            .unwrap_err();
        assert_eq!(err, BackendError::Server("similar user exists".into()));
    }

    #[test]
    fn failure_without_message_gets_fallback() {
        let err = open_envelope(json!({"success": false})).unwrap_err();
        assert_eq!(err, BackendError::Server(FALLBACK_MESSAGE.into()));
    }

    #[test]
    fn bare_object_and_array_are_success() {
        let payload = open_envelope(json!({"detected": true, "message": "blink"})).unwrap();
        assert_eq!(payload["detected"], true);

        let payload = open_envelope(json!([{"username": "alice"}])).unwrap();
        assert!(payload.is_array());
    }

    #[test]
    fn null_data_falls_back_to_object() {
        let payload = open_envelope(json!({"success": true, "data": null, "exists": false})).unwrap();
        assert_eq!(payload["exists"], false);
    }

    #[test]
    fn scalar_body_is_invalid() {
        assert!(matches!(
            open_envelope(json!("ok")),
            Err(BackendError::InvalidResponse(_))
        ));
    }

    #[test]
    fn http_error_prefers_envelope_message() {
        let err = decode_response(400, r#"{"status":"error","message":"bad image"}"#).unwrap_err();
        assert_eq!(err, BackendError::Server("bad image".into()));

        let err = decode_response(500, "<html>Internal Server Error</html>").unwrap_err();
        assert_eq!(err, BackendError::Server("HTTP 500".into()));

        let err = decode_response(502, r#"{"detail":"upstream"}"#).unwrap_err();
        assert_eq!(err, BackendError::Server("HTTP 502".into()));
    }

    #[test]
    fn non_json_success_is_invalid() {
        assert!(matches!(
            decode_response(200, "OK"),
            Err(BackendError::InvalidResponse(_))
        ));
    }
}
