use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use crate::net::{MultipartPart, RequestBody};

/// Per-call options for [`super::RequestCache::fetch`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub method: Method,
  pub headers: HeaderMap,
  pub body: Option<RequestBody>,
  /// Consult and populate the response cache (reads only)
  pub cache: bool,
  /// Overrides the configured default TTL
  pub cache_ttl: Option<Duration>,
  /// Times this request has already been replayed from the failed queue
  pub retry_count: u32,
  /// Overrides the configured deadline, clamped to the maximum
  pub timeout: Option<Duration>,
  /// Cache key patterns to invalidate once this call succeeds
  pub invalidates: Vec<String>,
}

impl Default for FetchOptions {
  fn default() -> Self {
    Self {
      method: Method::GET,
      headers: HeaderMap::new(),
      body: None,
      cache: true,
      cache_ttl: None,
      retry_count: 0,
      timeout: None,
      invalidates: Vec::new(),
    }
  }
}

impl FetchOptions {
  pub fn get() -> Self {
    Self::default()
  }

  pub fn with_method(method: Method, body: Option<Value>) -> Self {
    Self {
      method,
      body: body.map(RequestBody::Json),
      cache: false,
      ..Self::default()
    }
  }

  pub fn post(body: Value) -> Self {
    Self::with_method(Method::POST, Some(body))
  }

  pub fn put(body: Value) -> Self {
    Self::with_method(Method::PUT, Some(body))
  }

  pub fn delete() -> Self {
    Self::with_method(Method::DELETE, None)
  }

  /// Multipart media upload.
  pub fn upload(parts: Vec<MultipartPart>) -> Self {
    Self {
      method: Method::POST,
      body: Some(RequestBody::Multipart(parts)),
      cache: false,
      ..Self::default()
    }
  }

  pub fn with_cache(mut self, cache: bool) -> Self {
    self.cache = cache;
    self
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.cache_ttl = Some(ttl);
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.insert(name, value);
    self
  }

  /// Invalidate cache keys containing `pattern` after success.
  pub fn invalidating(mut self, pattern: impl Into<String>) -> Self {
    self.invalidates.push(pattern.into());
    self
  }

  pub fn is_read(&self) -> bool {
    self.method == Method::GET
  }

  /// Whether this call reads from and writes to the response cache.
  pub fn uses_cache(&self) -> bool {
    self.cache && self.is_read()
  }

  pub fn is_multipart(&self) -> bool {
    matches!(self.body, Some(RequestBody::Multipart(_)))
  }
}
