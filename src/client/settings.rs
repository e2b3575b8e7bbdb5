use color_eyre::{eyre::eyre, Result};
use reqwest::header::HeaderName;
use std::time::Duration;
use url::Url;

use super::retry::RetryPolicy;
use crate::config::{ApiConfig, RetryConfig};

/// Resolved request cache settings.
#[derive(Debug, Clone)]
pub struct ClientSettings {
  pub base_url: Url,
  pub auth_header: HeaderName,
  pub client_version: String,
  pub timeout: Duration,
  pub max_timeout: Duration,
  pub default_ttl: Duration,
  pub stale_fallback: Duration,
  pub max_cache_entries: usize,
  pub failed_queue_capacity: usize,
  pub batch_concurrency: usize,
  pub retry: RetryPolicy,
}

impl ClientSettings {
  /// Default settings against `base_url`.
  pub fn new(base_url: Url) -> Self {
    let api = ApiConfig::default();
    Self {
      base_url,
      auth_header: HeaderName::from_static("x-telegram-auth"),
      client_version: api.client_version,
      timeout: Duration::from_millis(api.timeout_ms),
      max_timeout: Duration::from_millis(api.max_timeout_ms),
      default_ttl: Duration::from_millis(api.default_cache_ttl_ms),
      stale_fallback: Duration::from_millis(api.stale_fallback_ms),
      max_cache_entries: api.max_cache_entries,
      failed_queue_capacity: api.failed_queue_capacity,
      batch_concurrency: api.batch_concurrency,
      retry: RetryPolicy::default(),
    }
  }

  pub fn from_config(api: &ApiConfig, retry: &RetryConfig) -> Result<Self> {
    let base_url = Url::parse(&api.base_url)
      .map_err(|e| eyre!("Invalid api.base_url {}: {}", api.base_url, e))?;
    let auth_header = HeaderName::from_bytes(api.auth_header.as_bytes())
      .map_err(|e| eyre!("Invalid api.auth_header {}: {}", api.auth_header, e))?;

    Ok(Self {
      base_url,
      auth_header,
      client_version: api.client_version.clone(),
      timeout: Duration::from_millis(api.timeout_ms),
      max_timeout: Duration::from_millis(api.max_timeout_ms.max(api.timeout_ms)),
      default_ttl: Duration::from_millis(api.default_cache_ttl_ms),
      stale_fallback: Duration::from_millis(api.stale_fallback_ms),
      max_cache_entries: api.max_cache_entries,
      failed_queue_capacity: api.failed_queue_capacity,
      batch_concurrency: api.batch_concurrency.max(1),
      retry: RetryPolicy::from(retry),
    })
  }
}
