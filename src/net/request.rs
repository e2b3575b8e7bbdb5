use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

/// How the request was issued by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
  /// Top-level page navigation
  Navigate,
  /// Script-issued fetch
  #[default]
  Cors,
}

/// One file (or field) of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
  pub name: String,
  pub file_name: Option<String>,
  pub content_type: Option<String>,
  pub bytes: Vec<u8>,
}

impl MultipartPart {
  pub fn file(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      name: name.into(),
      file_name: Some(file_name.into()),
      content_type: None,
      bytes,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
  Json(Value),
  /// Media upload
  Multipart(Vec<MultipartPart>),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
  pub body: Option<RequestBody>,
  pub mode: RequestMode,
}

impl HttpRequest {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: HeaderMap::new(),
      body: None,
      mode: RequestMode::Cors,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// A page navigation to `url`.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: HeaderMap::new(),
      body: body.into(),
    }
  }

  /// A response with a JSON body and matching content type.
  pub fn json(status: StatusCode, value: &Value) -> Self {
    Self::new(status, value.to_string())
      .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.insert(name, value);
    self
  }

  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }

  pub fn header_str(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|v| v.to_str().ok())
  }

  pub fn is_json(&self) -> bool {
    self
      .header_str(CONTENT_TYPE.as_str())
      .map(|ct| ct.contains("application/json"))
      .unwrap_or(false)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_json_response_sets_content_type() {
    let response = HttpResponse::json(StatusCode::OK, &json!({"status": "success"}));
    assert!(response.is_json());
    assert!(response.is_success());
    assert_eq!(response.text(), r#"{"status":"success"}"#);
  }

  #[test]
  fn test_navigation_mode() {
    let url = Url::parse("https://crym.example/orders").unwrap();
    assert!(HttpRequest::navigate(url.clone()).is_navigation());
    assert!(!HttpRequest::get(url).is_navigation());
  }
}
