//! Validation of the backend response envelope.
//!
//! The backend answers `{status: "success", data}` or
//! `{status: "error", message, data?}`. Bodies are checked once, here, and
//! anything else is rejected as malformed.

use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use crate::net::HttpResponse;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope {
  Success {
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
  },
  Error {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    /// Set by the offline worker's synthetic response
    #[serde(default)]
    offline: bool,
  },
}

/// Turn a response into the unwrapped `data` payload or a typed error.
pub fn decode(response: &HttpResponse) -> Result<Value, ApiError> {
  if !response.is_success() {
    return Err(error_from_status(response));
  }

  if !response.is_json() {
    return Ok(Value::String(response.text()));
  }

  if response.body.iter().all(u8::is_ascii_whitespace) {
    return Ok(Value::Null);
  }

  let envelope: Envelope =
    serde_json::from_slice(&response.body).map_err(|e| ApiError::Malformed {
      status: response.status.as_u16(),
      message: e.to_string(),
    })?;

  match envelope {
    Envelope::Success { data, .. } => Ok(data),
    Envelope::Error {
      message,
      offline: true,
      ..
    } => Err(ApiError::offline(
      message.unwrap_or_else(|| "no connection".to_string()),
    )),
    Envelope::Error { message, data, .. } => Err(ApiError::Application {
      message: message.unwrap_or_else(|| "request failed".to_string()),
      data,
    }),
  }
}

fn error_from_status(response: &HttpResponse) -> ApiError {
  let status = response.status.as_u16();
  let body: Option<Value> = if response.is_json() {
    serde_json::from_slice(&response.body).ok()
  } else {
    None
  };

  let message = body
    .as_ref()
    .and_then(|b| b.get("message"))
    .and_then(Value::as_str)
    .map(String::from)
    .or_else(|| response.status.canonical_reason().map(String::from))
    .unwrap_or_else(|| "API error".to_string());

  let offline = body
    .as_ref()
    .and_then(|b| b.get("offline"))
    .and_then(Value::as_bool)
    .unwrap_or(false);

  if offline {
    return ApiError::offline(message);
  }

  ApiError::Status {
    status,
    message,
    data: body,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::StatusCode;
  use serde_json::json;

  #[test]
  fn test_success_unwraps_data() {
    let response = HttpResponse::json(
      StatusCode::OK,
      &json!({"status": "success", "data": {"id": 7}}),
    );
    assert_eq!(decode(&response).unwrap(), json!({"id": 7}));
  }

  #[test]
  fn test_error_in_body_is_application_error() {
    let response = HttpResponse::json(
      StatusCode::OK,
      &json!({"status": "error", "message": "client blocked", "data": {"reason": "debt"}}),
    );
    assert_eq!(
      decode(&response).unwrap_err(),
      ApiError::Application {
        message: "client blocked".into(),
        data: Some(json!({"reason": "debt"})),
      }
    );
  }

  #[test]
  fn test_unknown_shape_is_malformed() {
    let response = HttpResponse::json(StatusCode::OK, &json!({"orders": []}));
    assert!(matches!(
      decode(&response),
      Err(ApiError::Malformed { status: 200, .. })
    ));
  }

  #[test]
  fn test_http_failure_carries_body() {
    let response = HttpResponse::json(
      StatusCode::FORBIDDEN,
      &json!({"status": "error", "message": "forbidden for role"}),
    );
    match decode(&response).unwrap_err() {
      ApiError::Status {
        status,
        message,
        data,
      } => {
        assert_eq!(status, 403);
        assert_eq!(message, "forbidden for role");
        assert!(data.is_some());
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn test_offline_marker_is_offline_error() {
    let response = HttpResponse::json(
      StatusCode::SERVICE_UNAVAILABLE,
      &json!({"status": "error", "message": "no connection", "data": null, "offline": true}),
    );
    assert!(matches!(decode(&response), Err(ApiError::Offline { .. })));
  }

  #[test]
  fn test_plain_text_and_empty_bodies() {
    let text = HttpResponse::new(StatusCode::OK, "pong");
    assert_eq!(decode(&text).unwrap(), json!("pong"));

    let empty = HttpResponse::json(StatusCode::OK, &Value::Null);
    let empty = HttpResponse { body: Vec::new(), ..empty };
    assert_eq!(decode(&empty).unwrap(), Value::Null);
  }
}
