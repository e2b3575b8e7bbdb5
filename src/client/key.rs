//! Canonical request key derivation.
//!
//! One function serves both the single-flight registry and the response
//! cache: `METHOD:normalized-endpoint:body-fingerprint`. The endpoint stays
//! readable so that `invalidate("orders")` can match by substring. Headers
//! (auth, request id) never take part.

use reqwest::Method;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::net::RequestBody;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
  pub fn derive(method: &Method, endpoint: &str, body: Option<&RequestBody>) -> Self {
    Self(format!(
      "{}:{}:{}",
      method.as_str(),
      normalize_endpoint(endpoint),
      body_fingerprint(body)
    ))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Leading slash enforced, query pairs sorted, empty query dropped.
pub fn normalize_endpoint(endpoint: &str) -> String {
  let (path, query) = endpoint.split_once('?').unwrap_or((endpoint, ""));
  let path = if path.starts_with('/') {
    path.to_string()
  } else {
    format!("/{}", path)
  };

  let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
    .into_owned()
    .collect();
  if pairs.is_empty() {
    return path;
  }
  pairs.sort();

  let query = url::form_urlencoded::Serializer::new(String::new())
    .extend_pairs(pairs)
    .finish();
  format!("{}?{}", path, query)
}

fn body_fingerprint(body: Option<&RequestBody>) -> String {
  match body {
    None => "{}".to_string(),
    Some(RequestBody::Json(value)) => {
      let mut out = String::new();
      write_canonical(value, &mut out);
      out
    }
    Some(RequestBody::Multipart(parts)) => {
      let mut hasher = Sha256::new();
      for part in parts {
        hasher.update(part.name.as_bytes());
        hasher.update([0]);
        hasher.update(part.file_name.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(part.content_type.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update((part.bytes.len() as u64).to_be_bytes());
        hasher.update(&part.bytes);
      }
      format!("multipart:{}", hex::encode(hasher.finalize()))
    }
  }
}

/// JSON with object keys in sorted order, whatever map type serde_json uses.
fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      out.push('{');
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key], out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}
