//! Message protocol between the page and the worker.

use serde::Serialize;
use serde_json::Value;

use super::metrics::MetricsSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
  GetMetrics,
  ClearCache,
  SkipWaiting,
  /// Carries the unrecognised `type` (empty when absent)
  Unknown(String),
}

impl WorkerMessage {
  /// Parse `{type: "...", data?}`.
  pub fn parse(message: &Value) -> Self {
    match message.get("type").and_then(Value::as_str) {
      Some("GET_METRICS") => Self::GetMetrics,
      Some("CLEAR_CACHE") => Self::ClearCache,
      Some("SKIP_WAITING") => Self::SkipWaiting,
      other => Self::Unknown(other.unwrap_or_default().to_string()),
    }
  }

  pub fn type_name(&self) -> &str {
    match self {
      Self::GetMetrics => "GET_METRICS",
      Self::ClearCache => "CLEAR_CACHE",
      Self::SkipWaiting => "SKIP_WAITING",
      Self::Unknown(name) => name,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WorkerReply {
  Metrics(MetricsSnapshot),
  Cleared { success: bool },
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse() {
    assert_eq!(
      WorkerMessage::parse(&json!({"type": "GET_METRICS"})),
      WorkerMessage::GetMetrics
    );
    assert_eq!(
      WorkerMessage::parse(&json!({"type": "CLEAR_CACHE", "data": {}})),
      WorkerMessage::ClearCache
    );
    assert_eq!(
      WorkerMessage::parse(&json!({"type": "PING"})),
      WorkerMessage::Unknown("PING".into())
    );
    assert_eq!(
      WorkerMessage::parse(&json!("junk")),
      WorkerMessage::Unknown(String::new())
    );
  }

  #[test]
  fn test_reply_shapes() {
    assert_eq!(
      serde_json::to_value(WorkerReply::Cleared { success: true }).unwrap(),
      json!({"success": true})
    );
    let metrics = serde_json::to_value(WorkerReply::Metrics(MetricsSnapshot::default())).unwrap();
    assert_eq!(metrics["cacheHits"], 0);
  }
}
