//! Scripted in-process transport for tests.

use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Debug, Clone)]
pub enum Scripted {
  Respond(HttpResponse),
  Fail(TransportError),
  /// Wait, then play the inner step
  Delay(Duration, Box<Scripted>),
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
  pub method: Method,
  pub url: String,
  pub request: HttpRequest,
  pub at: Instant,
}

/// Plays queued steps in order, then repeats the fallback step (if any).
#[derive(Debug, Default)]
pub struct ScriptedTransport {
  script: Mutex<VecDeque<Scripted>>,
  fallback: Mutex<Option<Scripted>>,
  calls: Mutex<Vec<RecordedCall>>,
  offline: AtomicBool,
}

impl ScriptedTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, step: Scripted) -> &Self {
    self.script.lock().unwrap().push_back(step);
    self
  }

  pub fn respond(&self, response: HttpResponse) -> &Self {
    self.push(Scripted::Respond(response))
  }

  pub fn always(&self, step: Scripted) -> &Self {
    *self.fallback.lock().unwrap() = Some(step);
    self
  }

  /// While set, every send fails with a connection error.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<RecordedCall> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  fn next_step(&self) -> Option<Scripted> {
    let queued = self.script.lock().unwrap().pop_front();
    queued.or_else(|| self.fallback.lock().unwrap().clone())
  }
}

impl Transport for ScriptedTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    self.calls.lock().unwrap().push(RecordedCall {
      method: request.method.clone(),
      url: request.url.to_string(),
      request: request.clone(),
      at: Instant::now(),
    });

    if self.offline.load(Ordering::SeqCst) {
      return Err(TransportError::Connect("network unreachable".to_string()));
    }

    let mut step = self
      .next_step()
      .ok_or_else(|| TransportError::Connect("no scripted response".to_string()))?;

    loop {
      match step {
        Scripted::Respond(response) => return Ok(response),
        Scripted::Fail(error) => return Err(error),
        Scripted::Delay(delay, inner) => {
          tokio::time::sleep(delay).await;
          step = *inner;
        }
      }
    }
  }
}

/// `{status: "success", data}` with a 200 status.
pub fn success(data: Value) -> HttpResponse {
  HttpResponse::json(StatusCode::OK, &json!({"status": "success", "data": data}))
}

/// A bare status with a JSON error envelope.
pub fn status(code: u16) -> HttpResponse {
  let status = StatusCode::from_u16(code).unwrap();
  HttpResponse::json(
    status,
    &json!({"status": "error", "message": status.canonical_reason().unwrap_or("error")}),
  )
}

/// A plain (non-JSON) 200 body, as served for static assets.
pub fn asset(body: &str) -> HttpResponse {
  HttpResponse::new(StatusCode::OK, body.to_string())
}
