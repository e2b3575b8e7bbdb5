use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use reqwest::Method;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::events::{EventOutcome, Notification, PushPayload, WorkerEvent, SYNC_TAG};
use super::lifecycle::WorkerState;
use super::messages::{WorkerMessage, WorkerReply};
use super::metrics::{MetricsSnapshot, WorkerMetrics};
use super::response::{request_key, CachedHttpResponse};
use super::routes::{RouteTable, StrategyKind};
use super::served::Served;
use super::store::{CacheStorage, StoreKind, StoreNames};
use crate::clock::{Clock, SystemClock};
use crate::config::WorkerConfig;
use crate::net::{HttpRequest, HttpResponse, Transport, TransportError};

/// Resolved worker settings for one generation.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub generation: String,
  pub names: StoreNames,
  /// Base for relative manifest entries
  pub origin: Url,
  pub static_manifest: Vec<String>,
  pub shell_page: String,
  pub app_name: String,
  pub routes: RouteTable,
}

impl WorkerSettings {
  pub fn from_config(config: &WorkerConfig) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid worker.origin {}: {}", config.origin, e))?;

    Ok(Self {
      generation: config.generation.clone(),
      names: StoreNames::new(&config.cache_prefix, &config.generation),
      origin,
      static_manifest: config.static_manifest.clone(),
      shell_page: config.shell_page.clone(),
      app_name: config.app_name.clone(),
      routes: RouteTable::new(
        config.api_prefix.clone(),
        config.api_rules.clone(),
        config.default_api_rule.clone(),
      ),
    })
  }
}

pub(super) struct Inner<T, S> {
  pub(super) transport: T,
  pub(super) storage: S,
  pub(super) settings: WorkerSettings,
  pub(super) clock: Arc<dyn Clock>,
  pub(super) metrics: WorkerMetrics,
  state: Mutex<WorkerState>,
  clients_claimed: AtomicBool,
  background: Mutex<Vec<JoinHandle<()>>>,
}

impl<T, S> Inner<T, S> {
  pub(super) fn lock_background(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
    self.background.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Intercepts requests on their way to the network and answers them from
/// three generation-named stores according to the route table.
///
/// The worker is itself a [`Transport`], so it can sit underneath the request
/// cache.
pub struct OfflineWorker<T, S> {
  inner: Arc<Inner<T, S>>,
}

impl<T, S> Clone for OfflineWorker<T, S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: Transport, S: CacheStorage> OfflineWorker<T, S> {
  pub fn new(transport: T, storage: S, settings: WorkerSettings) -> Self {
    Self::with_clock(transport, storage, settings, Arc::new(SystemClock))
  }

  pub fn with_clock(
    transport: T,
    storage: S,
    settings: WorkerSettings,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        transport,
        storage,
        settings,
        clock,
        metrics: WorkerMetrics::default(),
        state: Mutex::new(WorkerState::default()),
        clients_claimed: AtomicBool::new(false),
        background: Mutex::new(Vec::new()),
      }),
    }
  }

  pub fn state(&self) -> WorkerState {
    *self.inner.lock_state()
  }

  pub fn settings(&self) -> &WorkerSettings {
    &self.inner.settings
  }

  pub fn storage(&self) -> &S {
    &self.inner.storage
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.inner.metrics.snapshot()
  }

  /// Whether activation took control of already-open clients.
  pub fn clients_claimed(&self) -> bool {
    self.inner.clients_claimed.load(Ordering::SeqCst)
  }

  /// Precache the shell manifest. Every asset must fetch successfully or
  /// nothing is written and the worker becomes redundant.
  pub async fn install(&self) -> Result<()> {
    self.transition(WorkerState::Installing)?;
    info!(generation = %self.inner.settings.generation, "installing worker");

    match self.precache().await {
      Ok(count) => {
        self.transition(WorkerState::Installed)?;
        info!(assets = count, "worker installed");
        Ok(())
      }
      Err(e) => {
        self.transition(WorkerState::Redundant)?;
        error!(error = %e, "worker installation failed");
        Err(e)
      }
    }
  }

  async fn precache(&self) -> Result<usize> {
    let inner = &self.inner;
    let fetches = inner
      .settings
      .static_manifest
      .iter()
      .map(|asset| self.fetch_asset(asset));
    let entries = try_join_all(fetches).await?;

    for store in inner.settings.names.all() {
      inner.storage.open_store(store)?;
    }
    inner
      .storage
      .put_all(inner.settings.names.name(StoreKind::Static), &entries)?;
    Ok(entries.len())
  }

  async fn fetch_asset(&self, asset: &str) -> Result<(String, CachedHttpResponse)> {
    let inner = &self.inner;
    let url = inner
      .settings
      .origin
      .join(asset)
      .map_err(|e| eyre!("Invalid manifest entry {}: {}", asset, e))?;

    let response = inner
      .transport
      .send(HttpRequest::get(url.clone()))
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;
    if !response.is_success() {
      return Err(eyre!("Failed to fetch {}: HTTP {}", url, response.status));
    }

    debug!(url = %url, "precached");
    Ok((
      request_key(&Method::GET, &url),
      CachedHttpResponse::stamp(&response, inner.clock.now_ms()),
    ))
  }

  /// Delete every store outside the current generation and take control of
  /// open clients. Returns the deleted store names.
  pub fn activate(&self) -> Result<Vec<String>> {
    self.transition(WorkerState::Activating)?;

    match self.cleanup_old_stores() {
      Ok(deleted) => {
        self.inner.metrics.reset();
        self.inner.clients_claimed.store(true, Ordering::SeqCst);
        self.transition(WorkerState::Active)?;
        info!(deleted = deleted.len(), "worker activated and controlling all clients");
        Ok(deleted)
      }
      Err(e) => {
        self.transition(WorkerState::Redundant)?;
        error!(error = %e, "worker activation failed");
        Err(e)
      }
    }
  }

  fn cleanup_old_stores(&self) -> Result<Vec<String>> {
    let names = &self.inner.settings.names;
    let mut deleted = Vec::new();

    for store in self.inner.storage.store_names()? {
      if !names.contains(&store) {
        info!(store = %store, "deleting old store");
        self.inner.storage.delete_store(&store)?;
        deleted.push(store);
      }
    }
    for store in names.all() {
      self.inner.storage.open_store(store)?;
    }
    Ok(deleted)
  }

  /// Bring the worker to `Active`. A generation whose stores already exist
  /// is resumed without re-fetching the manifest.
  pub async fn start(&self) -> Result<Vec<String>> {
    let existing = self.inner.storage.store_names()?;
    let installed = self
      .inner
      .settings
      .names
      .all()
      .iter()
      .all(|name| existing.iter().any(|e| e == name));

    if installed && self.state() == WorkerState::Parsed {
      info!(generation = %self.inner.settings.generation, "resuming installed worker");
      *self.inner.lock_state() = WorkerState::Installed;
    } else {
      self.install().await?;
    }
    self.activate()
  }

  /// Activate a waiting (installed) worker right away.
  pub fn skip_waiting(&self) -> Result<bool> {
    if self.state() != WorkerState::Installed {
      return Ok(false);
    }
    self.activate()?;
    Ok(true)
  }

  /// Answer a request. Only `Err` when a pass-through request fails; every
  /// intercepted request gets a response.
  pub async fn handle_fetch(&self, request: HttpRequest) -> Result<Served, TransportError> {
    let inner = &self.inner;
    inner.metrics.record_request();

    let scheme = request.url.scheme();
    let intercept = self.state().intercepts_fetches()
      && request.method == Method::GET
      && (scheme == "http" || scheme == "https");
    if !intercept {
      return inner.transport.send(request).await.map(Served::pass_through);
    }

    let route = inner.settings.routes.route(&request.url);
    let result = match route.strategy {
      StrategyKind::CacheFirst => inner.cache_first(&request, &route).await,
      StrategyKind::NetworkFirst => inner.network_first(&request, &route).await,
      StrategyKind::StaleWhileRevalidate => inner.stale_while_revalidate(&request, &route).await,
    };

    match result {
      Ok(served) => {
        debug!(
          url = %request.url,
          class = ?route.class,
          source = ?served.source,
          from_cache = served.is_from_cache(),
          "served"
        );
        Ok(served)
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "request failed, using offline fallback");
        inner.metrics.record_offline();
        Ok(inner.offline_response(&request))
      }
    }
  }

  /// Wait for background revalidations started so far.
  pub async fn flush_background(&self) {
    let tasks: Vec<JoinHandle<()>> = self.inner.lock_background().drain(..).collect();
    for task in tasks {
      if let Err(e) = task.await {
        warn!(error = %e, "background task failed");
      }
    }
  }

  pub fn handle_message(&self, message: &Value) -> Result<Option<WorkerReply>> {
    match WorkerMessage::parse(message) {
      WorkerMessage::GetMetrics => Ok(Some(WorkerReply::Metrics(self.metrics()))),
      WorkerMessage::ClearCache => {
        self.clear_all()?;
        Ok(Some(WorkerReply::Cleared { success: true }))
      }
      WorkerMessage::SkipWaiting => {
        self.skip_waiting()?;
        Ok(None)
      }
      unknown => {
        info!(message_type = unknown.type_name(), "unknown message type");
        Ok(None)
      }
    }
  }

  /// Delete every store, current generation included, and reset metrics.
  pub fn clear_all(&self) -> Result<usize> {
    let names = self.inner.storage.store_names()?;
    for name in &names {
      self.inner.storage.delete_store(name)?;
    }
    self.inner.metrics.reset();
    info!(stores = names.len(), "all caches cleared");
    Ok(names.len())
  }

  /// Notification for a push; `None` for an empty or unreadable push.
  pub fn handle_push(&self, data: Option<&[u8]>) -> Option<Notification> {
    let data = data.filter(|d| !d.is_empty())?;
    match serde_json::from_slice::<PushPayload>(data) {
      Ok(payload) => Some(Notification::from_push(payload, &self.inner.settings.app_name)),
      Err(e) => {
        warn!(error = %e, "ignoring unreadable push payload");
        None
      }
    }
  }

  /// URL to open for a clicked notification.
  pub fn handle_notification_click(&self, notification: &Notification) -> String {
    notification.click_target().to_string()
  }

  /// True when the sync tag asks for failed requests to be replayed.
  pub fn handle_sync(&self, tag: &str) -> bool {
    let replay = tag == SYNC_TAG;
    if replay {
      info!("background sync started");
    } else {
      debug!(tag, "ignoring sync tag");
    }
    replay
  }

  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    let outcome = match event {
      WorkerEvent::Install => {
        self.install().await?;
        EventOutcome::Lifecycle(self.state())
      }
      WorkerEvent::Activate => {
        self.activate()?;
        EventOutcome::Lifecycle(self.state())
      }
      WorkerEvent::Fetch(request) => EventOutcome::Response(self.handle_fetch(request).await),
      WorkerEvent::Message(message) => EventOutcome::Reply(self.handle_message(&message)?),
      WorkerEvent::Push(data) => match self.handle_push(data.as_deref()) {
        Some(notification) => EventOutcome::ShowNotification(notification),
        None => EventOutcome::Ignored,
      },
      WorkerEvent::NotificationClick(notification) => {
        EventOutcome::OpenWindow(self.handle_notification_click(&notification))
      }
      WorkerEvent::Sync(tag) => {
        if self.handle_sync(&tag) {
          EventOutcome::ReplayFailedRequests
        } else {
          EventOutcome::Ignored
        }
      }
    };
    Ok(outcome)
  }

  fn transition(&self, next: WorkerState) -> Result<()> {
    let mut state = self.inner.lock_state();
    if !state.can_transition_to(next) {
      return Err(eyre!("Invalid worker transition {:?} -> {:?}", *state, next));
    }
    debug!(from = ?*state, to = ?next, "worker state");
    *state = next;
    Ok(())
  }
}

impl<T: Transport, S: CacheStorage> Transport for OfflineWorker<T, S> {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    self.handle_fetch(request).await.map(|served| served.response)
  }
}
