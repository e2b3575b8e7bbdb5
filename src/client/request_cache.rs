use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::envelope::decode;
use super::error::ApiError;
use super::inflight::InFlight;
use super::key::RequestKey;
use super::memory::{CacheEntry, ResponseCache};
use super::metrics::{ClientMetrics, Statistics};
use super::options::FetchOptions;
use super::queue::{FailedRequestQueue, FailedRequestRecord};
use super::settings::ClientSettings;
use crate::clock::{Clock, SystemClock};
use crate::net::{
  Connectivity, ConnectivityFlag, EnvSession, HttpRequest, RequestMode, SessionProvider,
  Transport, TransportError,
};

const CLIENT_VERSION: &str = "x-client-version";
const REQUEST_ID: &str = "x-request-id";

/// Outcome of [`RequestCache::retry_failed_requests`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
  pub attempted: usize,
  pub succeeded: usize,
  pub still_failing: usize,
}

struct Inner<T> {
  transport: T,
  settings: ClientSettings,
  session: Arc<dyn SessionProvider>,
  connectivity: Arc<dyn Connectivity>,
  clock: Arc<dyn Clock>,
  cache: Mutex<ResponseCache>,
  in_flight: Arc<InFlight>,
  failed: Mutex<FailedRequestQueue>,
  metrics: Mutex<ClientMetrics>,
  request_seq: AtomicU64,
}

/// Client-side cache in front of a [`Transport`].
///
/// Cloning is cheap; clones share every piece of state.
pub struct RequestCache<T> {
  inner: Arc<Inner<T>>,
}

impl<T> Clone for RequestCache<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

pub struct RequestCacheBuilder<T> {
  transport: T,
  settings: ClientSettings,
  session: Arc<dyn SessionProvider>,
  connectivity: Arc<dyn Connectivity>,
  clock: Arc<dyn Clock>,
}

impl<T: Transport> RequestCacheBuilder<T> {
  pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
    self.session = session;
    self
  }

  pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
    self.connectivity = connectivity;
    self
  }

  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn build(self) -> RequestCache<T> {
    let settings = self.settings;
    RequestCache {
      inner: Arc::new(Inner {
        transport: self.transport,
        cache: Mutex::new(ResponseCache::new(settings.max_cache_entries)),
        failed: Mutex::new(FailedRequestQueue::new(settings.failed_queue_capacity)),
        settings,
        session: self.session,
        connectivity: self.connectivity,
        clock: self.clock,
        in_flight: InFlight::new(),
        metrics: Mutex::new(ClientMetrics::default()),
        request_seq: AtomicU64::new(0),
      }),
    }
  }
}

impl<T: Transport> RequestCache<T> {
  pub fn new(transport: T, settings: ClientSettings) -> Self {
    Self::builder(transport, settings).build()
  }

  /// Builder with environment session, always-online connectivity and the
  /// system clock.
  pub fn builder(transport: T, settings: ClientSettings) -> RequestCacheBuilder<T> {
    RequestCacheBuilder {
      transport,
      settings,
      session: Arc::new(EnvSession),
      connectivity: Arc::new(ConnectivityFlag::default()),
      clock: Arc::new(SystemClock),
    }
  }

  pub fn settings(&self) -> &ClientSettings {
    &self.inner.settings
  }

  /// Fetch `endpoint` through the cache.
  ///
  /// An identical call already in flight is joined instead of re-sent; a
  /// fresh cached read is returned without touching the network.
  pub async fn fetch(&self, endpoint: &str, options: FetchOptions) -> Result<Value, ApiError> {
    let key = RequestKey::derive(&options.method, endpoint, options.body.as_ref());
    let epoch = self.cache().epoch();

    if let Some(pending) = self.inner.in_flight.get(key.as_str(), epoch) {
      debug!(%key, "joining identical in-flight request");
      return pending.await;
    }

    if options.uses_cache() {
      if let Some(payload) = self.cached_payload(&key) {
        debug!(endpoint, "cache hit");
        return Ok(payload);
      }
    }

    let this = self.clone();
    let endpoint = endpoint.to_string();
    let op_key = key.clone();
    let op = async move { this.settle(&endpoint, &op_key, epoch, options).await };
    self.inner.in_flight.join_or_start(key.as_str(), epoch, op).await
  }

  /// [`fetch`](Self::fetch) and deserialize the payload.
  pub async fn fetch_json<D: DeserializeOwned>(
    &self,
    endpoint: &str,
    options: FetchOptions,
  ) -> Result<D, ApiError> {
    let payload = self.fetch(endpoint, options).await?;
    serde_json::from_value(payload).map_err(|e| ApiError::Malformed {
      status: 200,
      message: format!("unexpected payload shape: {}", e),
    })
  }

  /// Run `requests` with bounded concurrency. Results keep request order.
  pub async fn batch(&self, requests: Vec<(String, FetchOptions)>) -> Vec<Result<Value, ApiError>> {
    let concurrency = self.inner.settings.batch_concurrency.max(1);
    debug!(count = requests.len(), concurrency, "processing batch");

    stream::iter(requests)
      .map(|(endpoint, options)| async move { self.fetch(&endpoint, options).await })
      .buffered(concurrency)
      .collect()
      .await
  }

  /// Remove every cached entry whose key contains `pattern`.
  pub fn invalidate(&self, pattern: &str) -> usize {
    let removed = self.cache().invalidate(pattern);
    debug!(pattern, removed, "invalidated cache entries");
    removed
  }

  pub fn clear_cache(&self) {
    self.cache().clear();
    info!("response cache cleared");
  }

  /// Resubmit every queued request once. Records that still fail go back
  /// on the queue.
  pub async fn retry_failed_requests(&self) -> ReplayReport {
    let records = self.failed().drain();
    let mut report = ReplayReport {
      attempted: records.len(),
      ..ReplayReport::default()
    };
    if records.is_empty() {
      return report;
    }
    info!(count = records.len(), "retrying failed requests");

    let mut still_failing = Vec::new();
    for record in records {
      let mut options = record.options.clone();
      options.retry_count = 0;
      let started = Instant::now();

      match self.execute(&record.endpoint, &options).await {
        Ok(_) => {
          self.lock_metrics().record_success(started.elapsed());
          for pattern in &options.invalidates {
            self.invalidate(pattern);
          }
          report.succeeded += 1;
        }
        Err(error) => {
          warn!(endpoint = %record.endpoint, %error, "still failing");
          self.lock_metrics().record_failure();
          still_failing.push(FailedRequestRecord {
            error,
            timestamp: self.inner.clock.now_ms(),
            retry_count: record.retry_count + 1,
            ..record
          });
        }
      }
    }

    report.still_failing = still_failing.len();
    let mut failed = self.failed();
    for record in still_failing {
      failed.push(record);
    }
    report
  }

  /// Abort every in-flight operation; their waiters see [`ApiError::Cancelled`].
  pub fn cancel_all(&self) -> usize {
    let cancelled = self.inner.in_flight.cancel_all();
    info!(cancelled, "all requests cancelled");
    cancelled
  }

  pub fn metrics(&self) -> ClientMetrics {
    self.lock_metrics().clone()
  }

  pub fn statistics(&self) -> Statistics {
    Statistics::new(
      self.metrics(),
      self.cache().len(),
      self.pending_count(),
      self.failed_count(),
    )
  }

  pub fn pending_count(&self) -> usize {
    self.inner.in_flight.len()
  }

  pub fn failed_count(&self) -> usize {
    self.failed().len()
  }

  async fn settle(
    &self,
    endpoint: &str,
    key: &RequestKey,
    epoch: u64,
    options: FetchOptions,
  ) -> Result<Value, ApiError> {
    let started = Instant::now();

    match self.execute(endpoint, &options).await {
      Ok(payload) => {
        if options.uses_cache() && !self.store(key, &payload, options.cache_ttl, epoch) {
          debug!(endpoint, "cache invalidated while in flight, result not stored");
        }
        for pattern in &options.invalidates {
          self.invalidate(pattern);
        }
        let elapsed = started.elapsed();
        self.lock_metrics().record_success(elapsed);
        info!(
          endpoint,
          method = %options.method,
          elapsed_ms = elapsed.as_millis() as u64,
          "API success"
        );
        Ok(payload)
      }
      Err(error) => {
        self.lock_metrics().record_failure();
        warn!(endpoint, method = %options.method, %error, "API error");
        self.recover(endpoint, key, options, error)
      }
    }
  }

  /// Offline handling for a call that failed for good: reads fall back to a
  /// recent cached payload, mutations are queued for replay.
  fn recover(
    &self,
    endpoint: &str,
    key: &RequestKey,
    options: FetchOptions,
    error: ApiError,
  ) -> Result<Value, ApiError> {
    let settings = &self.inner.settings;
    let offline =
      matches!(error, ApiError::Offline { .. }) || !self.inner.connectivity.is_online();
    if !offline || !error.is_connectivity_failure(&settings.retry.retryable_statuses) {
      return Err(error);
    }

    let now = self.inner.clock.now_ms();
    if options.is_read() {
      if options.cache {
        let cache = self.cache();
        if let Some(entry) = cache.get_within(key.as_str(), now, settings.stale_fallback) {
          warn!(endpoint, age_ms = entry.age_ms(now), "offline, serving cached data");
          return Ok(entry.payload.clone());
        }
      }
      return Err(error);
    }

    let message = match &error {
      ApiError::Offline { message, .. } => message.clone(),
      other => other.to_string(),
    };
    let record = FailedRequestRecord {
      endpoint: endpoint.to_string(),
      retry_count: options.retry_count,
      options,
      error,
      timestamp: now,
    };
    let mut failed = self.failed();
    if let Some(evicted) = failed.push(record) {
      warn!(
        endpoint = %evicted.endpoint,
        dropped_total = failed.dropped(),
        "failed-request queue full, dropped oldest"
      );
    }
    drop(failed);
    info!(endpoint, "queued request for replay on reconnect");

    Err(ApiError::Offline {
      message,
      queued: true,
    })
  }

  /// One logical call: build, send with retries, decode.
  async fn execute(&self, endpoint: &str, options: &FetchOptions) -> Result<Value, ApiError> {
    self.ensure_online()?;
    let request = self.build_request(endpoint, options)?;
    let timeout = self.timeout_for(options);
    let policy = &self.inner.settings.retry;

    let mut attempt = 0;
    loop {
      let error = match self.attempt(request.clone(), timeout).await {
        Ok(payload) => return Ok(payload),
        Err(error) => error,
      };

      if attempt >= policy.max_retries || !policy.should_retry(&error) {
        return Err(error);
      }

      let delay = policy.delay_for_attempt(attempt);
      attempt += 1;
      debug!(
        endpoint,
        attempt,
        delay_ms = delay.as_millis() as u64,
        %error,
        "retrying request"
      );
      tokio::time::sleep(delay).await;
      self.ensure_online()?;
    }
  }

  async fn attempt(&self, request: HttpRequest, timeout: Duration) -> Result<Value, ApiError> {
    let response = match tokio::time::timeout(timeout, self.inner.transport.send(request)).await {
      Ok(Ok(response)) => response,
      Ok(Err(TransportError::Timeout)) | Err(_) => return Err(ApiError::Timeout { after: timeout }),
      Ok(Err(e)) => {
        return Err(ApiError::Network {
          message: e.to_string(),
        })
      }
    };
    decode(&response)
  }

  fn build_request(&self, endpoint: &str, options: &FetchOptions) -> Result<HttpRequest, ApiError> {
    let settings = &self.inner.settings;
    let url = endpoint_url(&settings.base_url, endpoint)?;

    let mut headers = HeaderMap::new();
    if !options.is_multipart() {
      headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    headers.insert(
      HeaderName::from_static(CLIENT_VERSION),
      header_value(&settings.client_version)?,
    );
    headers.insert(
      HeaderName::from_static(REQUEST_ID),
      header_value(&self.next_request_id())?,
    );
    headers.extend(options.headers.clone());

    match self.inner.session.session_token() {
      Some(token) => {
        headers.insert(settings.auth_header.clone(), header_value(&token)?);
      }
      None => warn!(endpoint, "no session token available, request may be rejected"),
    }

    Ok(HttpRequest {
      method: options.method.clone(),
      url,
      headers,
      body: options.body.clone(),
      mode: RequestMode::Cors,
    })
  }

  fn timeout_for(&self, options: &FetchOptions) -> Duration {
    let settings = &self.inner.settings;
    options
      .timeout
      .unwrap_or(settings.timeout)
      .min(settings.max_timeout)
  }

  fn ensure_online(&self) -> Result<(), ApiError> {
    if self.inner.connectivity.is_online() {
      Ok(())
    } else {
      Err(ApiError::offline("no internet connection"))
    }
  }

  fn next_request_id(&self) -> String {
    let seq = self.inner.request_seq.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", self.inner.clock.now_ms(), seq)
  }

  fn cached_payload(&self, key: &RequestKey) -> Option<Value> {
    let now = self.inner.clock.now_ms();
    let payload = self
      .cache()
      .get_fresh(key.as_str(), now)
      .map(|entry| entry.payload.clone())?;
    self.lock_metrics().record_cache_hit();
    Some(payload)
  }

  fn store(&self, key: &RequestKey, payload: &Value, ttl: Option<Duration>, epoch: u64) -> bool {
    let now = self.inner.clock.now_ms();
    let entry = CacheEntry {
      key: key.as_str().to_string(),
      payload: payload.clone(),
      stored_at: now,
      ttl: Some(ttl.unwrap_or(self.inner.settings.default_ttl)),
    };
    self.cache().insert_if_current(entry, now, epoch)
  }

  fn cache(&self) -> MutexGuard<'_, ResponseCache> {
    self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn failed(&self) -> MutexGuard<'_, FailedRequestQueue> {
    self.inner.failed.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_metrics(&self) -> MutexGuard<'_, ClientMetrics> {
    self.inner.metrics.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

fn endpoint_url(base: &Url, endpoint: &str) -> Result<Url, ApiError> {
  let joined = format!(
    "{}/{}",
    base.as_str().trim_end_matches('/'),
    endpoint.trim_start_matches('/')
  );
  Url::parse(&joined).map_err(|e| ApiError::Internal(format!("invalid endpoint {}: {}", endpoint, e)))
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
  HeaderValue::from_str(value).map_err(|e| ApiError::Internal(format!("invalid header value: {}", e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::client::RetryPolicy;
  use crate::net::testing::{status, success, Scripted, ScriptedTransport};
  use crate::net::{HttpResponse, StaticSession};
  use reqwest::{Method, StatusCode};
  use serde_json::json;

  struct Harness {
    cache: RequestCache<Arc<ScriptedTransport>>,
    transport: Arc<ScriptedTransport>,
    clock: Arc<ManualClock>,
    connectivity: Arc<ConnectivityFlag>,
  }

  fn harness_with(settings: ClientSettings) -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let connectivity = Arc::new(ConnectivityFlag::default());
    let cache = RequestCache::builder(Arc::clone(&transport), settings)
      .session(Arc::new(StaticSession(Some("init-data".to_string()))))
      .connectivity(connectivity.clone())
      .clock(clock.clone())
      .build();
    Harness {
      cache,
      transport,
      clock,
      connectivity,
    }
  }

  fn settings() -> ClientSettings {
    ClientSettings::new(Url::parse("http://crym.test").unwrap())
  }

  fn harness() -> Harness {
    harness_with(settings())
  }

  #[tokio::test]
  async fn test_concurrent_identical_reads_share_one_call() {
    let h = harness();
    h.transport.push(Scripted::Delay(
      Duration::from_millis(50),
      Box::new(Scripted::Respond(success(json!([{"id": 1}])))),
    ));

    let calls = (0..5).map(|_| h.cache.fetch("/api/user/orders", FetchOptions::get()));
    let results = futures::future::join_all(calls).await;

    assert_eq!(h.transport.call_count(), 1);
    for result in results {
      assert_eq!(result.unwrap(), json!([{"id": 1}]));
    }
    assert_eq!(h.cache.pending_count(), 0);
  }

  #[tokio::test]
  async fn test_fresh_entry_served_until_ttl_elapses() {
    let h = harness();
    h.transport.respond(success(json!({"v": 1})));
    h.transport.respond(success(json!({"v": 2})));

    let ttl = Duration::from_millis(5_000);
    let options = FetchOptions::get().with_ttl(ttl);

    assert_eq!(
      h.cache.fetch("/api/user/profile", options.clone()).await.unwrap(),
      json!({"v": 1})
    );

    h.clock.advance(ttl);
    assert_eq!(
      h.cache.fetch("/api/user/profile", options.clone()).await.unwrap(),
      json!({"v": 1})
    );
    assert_eq!(h.transport.call_count(), 1);

    h.clock.advance(Duration::from_millis(1));
    assert_eq!(
      h.cache.fetch("/api/user/profile", options).await.unwrap(),
      json!({"v": 2})
    );
    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(h.cache.metrics().cache_hits, 1);
  }

  #[tokio::test]
  async fn test_cache_disabled_always_hits_network() {
    let h = harness();
    h.transport.always(Scripted::Respond(success(json!(1))));

    h.cache.fetch("/api/a", FetchOptions::get()).await.unwrap();
    h.cache
      .fetch("/api/a", FetchOptions::get().with_cache(false))
      .await
      .unwrap();
    assert_eq!(h.transport.call_count(), 2);
  }

  #[tokio::test]
  async fn test_invalidate_removes_every_matching_key() {
    let h = harness();
    h.transport.always(Scripted::Respond(success(json!([]))));

    for endpoint in ["/api/user/orders", "/api/admin/orders?page=1", "/api/user/profile"] {
      h.cache.fetch(endpoint, FetchOptions::get()).await.unwrap();
    }
    assert_eq!(h.cache.statistics().cache_size, 3);

    assert_eq!(h.cache.invalidate("orders"), 2);
    assert_eq!(h.cache.statistics().cache_size, 1);

    h.cache.fetch("/api/user/orders", FetchOptions::get()).await.unwrap();
    h.cache.fetch("/api/user/profile", FetchOptions::get()).await.unwrap();
    assert_eq!(h.transport.call_count(), 4);
  }

  #[tokio::test]
  async fn test_mutation_invalidates_so_next_read_is_fresh() {
    let h = harness();
    h.transport.respond(success(json!([])));
    h.transport.respond(success(json!({"id": 7})));
    h.transport.respond(success(json!([{"id": 7}])));

    h.cache.fetch("/api/user/orders", FetchOptions::get()).await.unwrap();
    h.cache
      .fetch(
        "/api/orders",
        FetchOptions::post(json!({"service": "cleaning"})).invalidating("orders"),
      )
      .await
      .unwrap();

    let orders = h.cache.fetch("/api/user/orders", FetchOptions::get()).await.unwrap();
    assert_eq!(orders, json!([{"id": 7}]));
    assert_eq!(h.transport.call_count(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_status_retried_with_growing_backoff() {
    let h = harness();
    h.transport.always(Scripted::Respond(status(503)));

    let result = h.cache.fetch("/api/user/orders", FetchOptions::get()).await;
    assert!(matches!(result, Err(ApiError::Status { status: 503, .. })));

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 4);
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].at - w[0].at).collect();
    assert!(gaps.windows(2).all(|w| w[1] >= w[0]));
    assert!(gaps[0] >= Duration::from_millis(1_000));
  }

  #[tokio::test(start_paused = true)]
  async fn test_network_error_then_success() {
    let h = harness();
    h.transport
      .push(Scripted::Fail(TransportError::Connect("reset".into())))
      .respond(success(json!("ok")));

    let result = h.cache.fetch("/api/user/profile", FetchOptions::get()).await;
    assert_eq!(result.unwrap(), json!("ok"));
    assert_eq!(h.transport.call_count(), 2);
  }

  #[tokio::test]
  async fn test_application_error_is_not_retried() {
    let h = harness();
    h.transport.always(Scripted::Respond(HttpResponse::json(
      StatusCode::OK,
      &json!({"status": "error", "message": "client is blocked", "data": {"blocked": true}}),
    )));

    let error = h
      .cache
      .fetch("/api/orders", FetchOptions::post(json!({})))
      .await
      .unwrap_err();
    assert_eq!(error.to_string(), "client is blocked");
    assert_eq!(error.data(), Some(&json!({"blocked": true})));
    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(h.cache.failed_count(), 0);
  }

  #[tokio::test]
  async fn test_non_retryable_status_fails_once() {
    let h = harness();
    h.transport.always(Scripted::Respond(status(404)));

    let error = h.cache.fetch("/api/missing", FetchOptions::get()).await.unwrap_err();
    assert_eq!(error.status(), 404);
    assert_eq!(h.transport.call_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_slow_response_times_out() {
    let mut settings = settings();
    settings.retry = RetryPolicy::none();
    let h = harness_with(settings);
    h.transport.push(Scripted::Delay(
      Duration::from_secs(20),
      Box::new(Scripted::Respond(success(json!(1)))),
    ));

    let error = h.cache.fetch("/api/slow", FetchOptions::get()).await.unwrap_err();
    assert_eq!(
      error,
      ApiError::Timeout {
        after: Duration::from_secs(15)
      }
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_timed_out_attempt_is_retried() {
    let h = harness();
    h.transport
      .push(Scripted::Delay(
        Duration::from_secs(20),
        Box::new(Scripted::Respond(success(json!("late")))),
      ))
      .respond(success(json!("ok")));

    let result = h.cache.fetch("/api/slow", FetchOptions::get()).await;
    assert_eq!(result.unwrap(), json!("ok"));
    assert_eq!(h.transport.call_count(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_read_in_flight_during_invalidation_is_not_cached() {
    let h = harness();
    h.transport
      .push(Scripted::Delay(
        Duration::from_millis(50),
        Box::new(Scripted::Respond(success(json!([])))),
      ))
      .respond(success(json!({"id": 7})))
      .respond(success(json!([{"id": 7}])));

    let slow = tokio::spawn({
      let cache = h.cache.clone();
      async move { cache.fetch("/api/user/orders", FetchOptions::get()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.transport.call_count(), 1);

    h.cache
      .fetch(
        "/api/orders",
        FetchOptions::post(json!({"service": "cleaning"})).invalidating("orders"),
      )
      .await
      .unwrap();

    // Does not join the read that started before the invalidation.
    let fresh = h.cache.fetch("/api/user/orders", FetchOptions::get()).await.unwrap();
    assert_eq!(fresh, json!([{"id": 7}]));
    assert_eq!(h.transport.call_count(), 3);

    assert_eq!(slow.await.unwrap().unwrap(), json!([]));

    let orders = h.cache.fetch("/api/user/orders", FetchOptions::get()).await.unwrap();
    assert_eq!(orders, json!([{"id": 7}]));
    assert_eq!(h.transport.call_count(), 3);
  }

  #[tokio::test]
  async fn test_offline_mutation_queued_then_replayed() {
    let h = harness();
    h.connectivity.set_online(false);

    let error = h
      .cache
      .fetch("/api/orders", FetchOptions::post(json!({"service": "repair"})))
      .await
      .unwrap_err();
    assert!(error.is_queued());
    assert_eq!(h.cache.failed_count(), 1);
    assert_eq!(h.transport.call_count(), 0);

    assert!(h.connectivity.set_online(true));
    h.transport.respond(success(json!({"id": 1})));

    let report = h.cache.retry_failed_requests().await;
    assert_eq!(
      report,
      ReplayReport {
        attempted: 1,
        succeeded: 1,
        still_failing: 0
      }
    );
    assert_eq!(h.cache.failed_count(), 0);

    let calls = h.transport.calls();
    assert_eq!(calls[0].method, Method::POST);
    assert_eq!(calls[0].url, "http://crym.test/api/orders");
  }

  #[tokio::test]
  async fn test_replay_keeps_records_that_still_fail() {
    let h = harness();
    h.connectivity.set_online(false);
    let _ = h.cache.fetch("/api/orders", FetchOptions::delete()).await;
    h.connectivity.set_online(true);
    h.transport.respond(status(400));

    let report = h.cache.retry_failed_requests().await;
    assert_eq!(report.still_failing, 1);
    assert_eq!(h.cache.failed_count(), 1);
  }

  #[tokio::test]
  async fn test_worker_offline_reply_queues_mutation() {
    let h = harness();
    h.transport.respond(HttpResponse::json(
      StatusCode::SERVICE_UNAVAILABLE,
      &json!({"status": "error", "message": "offline", "data": null, "offline": true}),
    ));

    let error = h
      .cache
      .fetch("/api/orders", FetchOptions::post(json!({})))
      .await
      .unwrap_err();
    assert!(error.is_queued());
    assert_eq!(h.transport.call_count(), 1);
  }

  #[tokio::test]
  async fn test_offline_read_falls_back_to_stale_entry() {
    let h = harness();
    h.transport.respond(success(json!({"name": "Ann"})));
    h.cache.fetch("/api/user/profile", FetchOptions::get()).await.unwrap();

    h.clock.advance(Duration::from_secs(600));
    h.connectivity.set_online(false);
    let profile = h.cache.fetch("/api/user/profile", FetchOptions::get()).await;
    assert_eq!(profile.unwrap(), json!({"name": "Ann"}));

    h.clock.advance(Duration::from_secs(3_600));
    let error = h.cache.fetch("/api/user/profile", FetchOptions::get()).await.unwrap_err();
    assert!(matches!(error, ApiError::Offline { queued: false, .. }));
  }

  #[tokio::test]
  async fn test_request_headers() {
    let h = harness();
    h.transport.respond(success(json!(null)));
    h.cache
      .fetch(
        "/api/user/profile",
        FetchOptions::get().with_header(
          HeaderName::from_static("x-extra"),
          HeaderValue::from_static("1"),
        ),
      )
      .await
      .unwrap();

    let request = &h.transport.calls()[0].request;
    assert_eq!(request.headers["x-telegram-auth"], "init-data");
    assert_eq!(request.headers[CONTENT_TYPE], "application/json");
    assert_eq!(request.headers["x-extra"], "1");
    assert!(request.headers.contains_key(CLIENT_VERSION));
    assert!(request.headers.contains_key(REQUEST_ID));
  }

  #[tokio::test]
  async fn test_batch_preserves_order() {
    let h = harness();
    h.transport.push(Scripted::Delay(
      Duration::from_millis(30),
      Box::new(Scripted::Respond(success(json!("slow")))),
    ));
    h.transport.respond(success(json!("fast")));

    let results = h
      .cache
      .batch(vec![
        ("/api/a".to_string(), FetchOptions::get()),
        ("/api/b".to_string(), FetchOptions::get()),
      ])
      .await;

    assert_eq!(results[0].as_ref().unwrap(), &json!("slow"));
    assert_eq!(results[1].as_ref().unwrap(), &json!("fast"));
  }

  #[tokio::test]
  async fn test_cancel_all_rejects_waiters() {
    let h = harness();
    h.transport.push(Scripted::Delay(
      Duration::from_secs(10),
      Box::new(Scripted::Respond(success(json!(1)))),
    ));

    let cache = h.cache.clone();
    let waiter = tokio::spawn(async move { cache.fetch("/api/slow", FetchOptions::get()).await });
    while h.cache.pending_count() == 0 {
      tokio::task::yield_now().await;
    }

    assert_eq!(h.cache.cancel_all(), 1);
    assert_eq!(waiter.await.unwrap(), Err(ApiError::Cancelled));
  }

  #[tokio::test]
  async fn test_fetch_json_deserializes() {
    #[derive(serde::Deserialize)]
    struct Profile {
      name: String,
    }

    let h = harness();
    h.transport.respond(success(json!({"name": "Ann"})));
    let profile: Profile = h
      .cache
      .fetch_json("/api/user/profile", FetchOptions::get())
      .await
      .unwrap();
    assert_eq!(profile.name, "Ann");
  }
}
