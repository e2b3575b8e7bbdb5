//! Error taxonomy surfaced by the request cache.
//!
//! | Variant | Meaning | Retried |
//! |---|---|---|
//! | `Network` | connection failure, no response | yes |
//! | `Status` | non-2xx response | when the status is in the retryable set |
//! | `Timeout` | the call exceeded its deadline | yes |
//! | `Application` | well-formed body with `status: "error"` | never |
//! | `Offline` | no connectivity, or the worker answered offline | never |
//! | `Malformed` | body failed envelope validation | never |
//! | `Cancelled` | aborted at teardown | never |

use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
  #[error("network error: {message}")]
  Network { message: String },

  #[error("HTTP {status}: {message}")]
  Status {
    status: u16,
    message: String,
    data: Option<Value>,
  },

  #[error("request timed out after {}ms", .after.as_millis())]
  Timeout { after: Duration },

  #[error("{message}")]
  Application { message: String, data: Option<Value> },

  #[error("offline: {message}")]
  Offline { message: String, queued: bool },

  #[error("malformed response (HTTP {status}): {message}")]
  Malformed { status: u16, message: String },

  #[error("request cancelled")]
  Cancelled,

  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  pub fn offline(message: impl Into<String>) -> Self {
    Self::Offline {
      message: message.into(),
      queued: false,
    }
  }

  /// HTTP-like status for the UI to branch on.
  pub fn status(&self) -> u16 {
    match self {
      Self::Status { status, .. } | Self::Malformed { status, .. } => *status,
      Self::Timeout { .. } => StatusCode::REQUEST_TIMEOUT.as_u16(),
      Self::Application { .. } => StatusCode::BAD_REQUEST.as_u16(),
      Self::Network { .. } | Self::Offline { .. } => StatusCode::SERVICE_UNAVAILABLE.as_u16(),
      Self::Cancelled => 499,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
    }
  }

  /// Structured payload attached by the backend (e.g. blocked-client detail).
  pub fn data(&self) -> Option<&Value> {
    match self {
      Self::Status { data, .. } | Self::Application { data, .. } => data.as_ref(),
      _ => None,
    }
  }

  /// True when the failure says nothing about the request itself, only about
  /// reaching the server. `retryable` is the configured transient status set.
  pub fn is_connectivity_failure(&self, retryable: &[u16]) -> bool {
    match self {
      Self::Network { .. } | Self::Timeout { .. } | Self::Offline { .. } => true,
      Self::Status { status, .. } => retryable.contains(status),
      _ => false,
    }
  }

  pub fn is_queued(&self) -> bool {
    matches!(self, Self::Offline { queued: true, .. })
  }
}
