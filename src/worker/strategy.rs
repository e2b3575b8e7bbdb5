//! Caching strategies. Each returns `Err` only when the network failed and no
//! usable stored response exists; the caller then runs the offline chain.

use std::sync::Arc;
use tracing::{debug, warn};

use super::offline::Inner;
use super::response::{request_key, CachedHttpResponse};
use super::routes::Route;
use super::served::Served;
use super::store::{CacheStorage, StoreKind};
use crate::net::{HttpRequest, HttpResponse, Transport, TransportError};

impl<T: Transport, S: CacheStorage> Inner<T, S> {
  /// Stored response, or `None` on a miss or a store failure.
  pub(super) fn lookup(&self, store: StoreKind, key: &str) -> Option<CachedHttpResponse> {
    let name = self.settings.names.name(store);
    match self.storage.get(name, key) {
      Ok(found) => found,
      Err(e) => {
        warn!(store = name, key, error = %e, "store read failed, treating as miss");
        None
      }
    }
  }

  /// Write a successful response; anything else is left uncached.
  pub(super) fn remember(&self, store: StoreKind, key: &str, response: &HttpResponse) {
    if !response.is_success() {
      return;
    }
    let name = self.settings.names.name(store);
    let cached = CachedHttpResponse::stamp(response, self.clock.now_ms());
    if let Err(e) = self.storage.put(name, key, &cached) {
      warn!(store = name, key, error = %e, "store write failed");
    }
  }

  pub(super) async fn cache_first(
    &self,
    request: &HttpRequest,
    route: &Route,
  ) -> Result<Served, TransportError> {
    let key = request_key(&request.method, &request.url);
    let cached = self.lookup(route.store, &key);

    if let Some(cached) = &cached {
      if !cached.is_expired(route.max_age, self.clock.now_ms()) {
        self.metrics.record_hit();
        return Ok(Served::from_cache(cached.to_response(), false));
      }
    }

    self.metrics.record_network();
    match self.transport.send(request.clone()).await {
      Ok(response) => {
        self.remember(route.store, &key, &response);
        Ok(Served::from_network(response))
      }
      Err(error) => {
        self.metrics.record_miss();
        match cached {
          Some(stale) => {
            debug!(url = %request.url, "network failed, serving expired entry");
            Ok(Served::from_cache(stale.to_response(), true))
          }
          None => Err(error),
        }
      }
    }
  }

  pub(super) async fn network_first(
    &self,
    request: &HttpRequest,
    route: &Route,
  ) -> Result<Served, TransportError> {
    let key = request_key(&request.method, &request.url);

    self.metrics.record_network();
    match self.transport.send(request.clone()).await {
      Ok(response) => {
        self.remember(route.store, &key, &response);
        Ok(Served::from_network(response))
      }
      Err(error) => {
        self.metrics.record_miss();
        match self.lookup(route.store, &key) {
          Some(cached) if !cached.is_expired(route.max_age, self.clock.now_ms()) => {
            self.metrics.record_hit();
            Ok(Served::from_cache(cached.to_response(), false))
          }
          _ => Err(error),
        }
      }
    }
  }

  pub(super) async fn stale_while_revalidate(
    self: &Arc<Self>,
    request: &HttpRequest,
    route: &Route,
  ) -> Result<Served, TransportError> {
    let key = request_key(&request.method, &request.url);
    let cached = self.lookup(route.store, &key);

    if let Some(cached) = &cached {
      if !cached.is_expired(route.max_age, self.clock.now_ms()) {
        self.metrics.record_hit();
        self.revalidate(request.clone(), route.store, key);
        return Ok(Served::from_cache(cached.to_response(), false));
      }
    }

    self.metrics.record_network();
    match self.transport.send(request.clone()).await {
      Ok(response) => {
        self.remember(route.store, &key, &response);
        Ok(Served::from_network(response))
      }
      Err(error) => {
        self.metrics.record_miss();
        match cached {
          Some(stale) => Ok(Served::from_cache(stale.to_response(), true)),
          None => Err(error),
        }
      }
    }
  }

  /// Refresh `key` in the background. Failures are logged only.
  fn revalidate(self: &Arc<Self>, request: HttpRequest, store: StoreKind, key: String) {
    let inner = Arc::clone(self);
    let handle = tokio::spawn(async move {
      let url = request.url.clone();
      match inner.transport.send(request).await {
        Ok(response) => inner.remember(store, &key, &response),
        Err(e) => warn!(url = %url, error = %e, "background revalidation failed"),
      }
    });

    let mut background = self.lock_background();
    background.retain(|task| !task.is_finished());
    background.push(handle);
  }
}
