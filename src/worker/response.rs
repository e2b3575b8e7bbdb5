use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use url::Url;

use crate::clock::duration_ms;
use crate::net::HttpResponse;

/// Write-time stamp used for expiry; stripped before a response is served.
pub const TIMESTAMP_HEADER: &str = "sw-cache-timestamp";

/// A response as held in a worker store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedHttpResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl CachedHttpResponse {
  /// Copy `response`, tagging it with the write time.
  pub fn stamp(response: &HttpResponse, now_ms: i64) -> Self {
    let mut headers: Vec<(String, String)> = response
      .headers
      .iter()
      .filter(|(name, _)| name.as_str() != TIMESTAMP_HEADER)
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    headers.push((TIMESTAMP_HEADER.to_string(), now_ms.to_string()));

    Self {
      status: response.status.as_u16(),
      headers,
      body: response.body.clone(),
    }
  }

  pub fn stored_at(&self) -> Option<i64> {
    self
      .headers
      .iter()
      .find(|(name, _)| name == TIMESTAMP_HEADER)
      .and_then(|(_, value)| value.parse().ok())
  }

  /// Without `max_age` nothing expires; with one, an unstamped entry is
  /// treated as expired.
  pub fn is_expired(&self, max_age: Option<Duration>, now_ms: i64) -> bool {
    match max_age {
      None => false,
      Some(max_age) => match self.stored_at() {
        Some(stored_at) => now_ms - stored_at > duration_ms(max_age),
        None => true,
      },
    }
  }

  pub fn to_response(&self) -> HttpResponse {
    let mut headers = HeaderMap::new();
    for (name, value) in &self.headers {
      if name == TIMESTAMP_HEADER {
        continue;
      }
      if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
      ) {
        headers.append(name, value);
      }
    }

    HttpResponse {
      status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
      headers,
      body: self.body.clone(),
    }
  }
}

/// Store key for a request: method plus the URL without its fragment.
pub fn request_key(method: &Method, url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  format!("{} {}", method, url)
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::CONTENT_TYPE;
  use serde_json::json;

  #[test]
  fn test_stamp_and_strip() {
    let response = HttpResponse::json(StatusCode::OK, &json!({"ok": true}));
    let cached = CachedHttpResponse::stamp(&response, 42);

    assert_eq!(cached.stored_at(), Some(42));
    let served = cached.to_response();
    assert!(served.headers.get(TIMESTAMP_HEADER).is_none());
    assert_eq!(served.headers[CONTENT_TYPE], "application/json");
    assert_eq!(served.body, response.body);
  }

  #[test]
  fn test_expiry() {
    let cached = CachedHttpResponse::stamp(&HttpResponse::new(StatusCode::OK, "x"), 1_000);
    let max_age = Some(Duration::from_millis(100));

    assert!(!cached.is_expired(None, 1_000_000));
    assert!(!cached.is_expired(max_age, 1_100));
    assert!(cached.is_expired(max_age, 1_101));

    let unstamped = CachedHttpResponse {
      status: 200,
      headers: Vec::new(),
      body: Vec::new(),
    };
    assert!(unstamped.is_expired(max_age, 0));
    assert!(!unstamped.is_expired(None, 0));
  }

  #[test]
  fn test_request_key_ignores_fragment() {
    let a = Url::parse("https://crym.example/index.html#top").unwrap();
    let b = Url::parse("https://crym.example/index.html").unwrap();
    assert_eq!(request_key(&Method::GET, &a), request_key(&Method::GET, &b));
    assert_eq!(
      request_key(&Method::GET, &b),
      "GET https://crym.example/index.html"
    );
  }
}
