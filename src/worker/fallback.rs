use reqwest::header::{HeaderValue, CACHE_CONTROL};
use reqwest::{Method, StatusCode};
use serde_json::json;
use tracing::debug;

use super::offline::Inner;
use super::response::request_key;
use super::served::Served;
use super::store::{CacheStorage, StoreKind};
use crate::net::{HttpRequest, HttpResponse, Transport};

const OFFLINE_MESSAGE: &str = "No internet connection";

impl<T: Transport, S: CacheStorage> Inner<T, S> {
  /// Last answer for a request whose strategy could not produce one:
  /// any stored copy, then the shell page for navigations, then a synthetic
  /// 503.
  pub(super) fn offline_response(&self, request: &HttpRequest) -> Served {
    let key = request_key(&request.method, &request.url);
    for store in StoreKind::ALL {
      if let Some(cached) = self.lookup(store, &key) {
        debug!(url = %request.url, store = self.settings.names.name(store), "offline hit");
        return Served::offline(cached.to_response());
      }
    }

    if request.is_navigation() {
      if let Ok(shell_url) = request.url.join(&self.settings.shell_page) {
        let shell_key = request_key(&Method::GET, &shell_url);
        if let Some(shell) = self.lookup(StoreKind::Static, &shell_key) {
          return Served::offline(shell.to_response());
        }
      }
    }

    if self.settings.routes.is_api(&request.url) {
      let body = json!({
        "status": "error",
        "message": OFFLINE_MESSAGE,
        "data": null,
        "offline": true,
      });
      return Served::offline(
        HttpResponse::json(StatusCode::SERVICE_UNAVAILABLE, &body)
          .with_header(CACHE_CONTROL, HeaderValue::from_static("no-cache")),
      );
    }

    Served::offline(HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE, "Offline"))
  }
}
