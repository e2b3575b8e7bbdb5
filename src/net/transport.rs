use color_eyre::{eyre::eyre, Result};
use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use super::request::{HttpRequest, HttpResponse, RequestBody};

/// Failure below the HTTP layer: no response was produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("connection failed: {0}")]
  Connect(String),

  #[error("request timed out")]
  Timeout,

  #[error("failed to build request: {0}")]
  Request(String),

  #[error("failed to read response body: {0}")]
  Body(String),
}

/// Something that can turn an [`HttpRequest`] into an [`HttpResponse`].
///
/// A non-2xx status is still a successful send; only the absence of a
/// response is an error.
pub trait Transport: Send + Sync + 'static {
  fn send(
    &self,
    request: HttpRequest,
  ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
  fn send(
    &self,
    request: HttpRequest,
  ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
    (**self).send(request)
  }
}

/// Transport over the real network.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("crymnet/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Transport for ReqwestTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    let mut builder = self
      .client
      .request(request.method, request.url)
      .headers(request.headers);

    match request.body {
      Some(RequestBody::Json(value)) => {
        let bytes = serde_json::to_vec(&value).map_err(|e| TransportError::Request(e.to_string()))?;
        builder = builder.body(bytes);
      }
      Some(RequestBody::Multipart(parts)) => {
        let mut form = Form::new();
        for part in parts {
          let mut field = Part::bytes(part.bytes);
          if let Some(file_name) = part.file_name {
            field = field.file_name(file_name);
          }
          if let Some(content_type) = part.content_type {
            field = field
              .mime_str(&content_type)
              .map_err(|e| TransportError::Request(e.to_string()))?;
          }
          form = form.part(part.name, field);
        }
        builder = builder.multipart(form);
      }
      None => {}
    }

    let response = builder.send().await.map_err(classify)?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
      .bytes()
      .await
      .map_err(|e| TransportError::Body(e.to_string()))?;

    Ok(HttpResponse {
      status,
      headers,
      body: body.to_vec(),
    })
  }
}

fn classify(error: reqwest::Error) -> TransportError {
  if error.is_timeout() {
    TransportError::Timeout
  } else if error.is_builder() {
    TransportError::Request(error.to_string())
  } else {
    TransportError::Connect(error.to_string())
  }
}
