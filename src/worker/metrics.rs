use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime request counters. Reset on activation and on CLEAR_CACHE.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
  cache_hits: AtomicU64,
  cache_misses: AtomicU64,
  network_requests: AtomicU64,
  offline_requests: AtomicU64,
  total_requests: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
  pub cache_hits: u64,
  pub cache_misses: u64,
  pub network_requests: u64,
  pub offline_requests: u64,
  pub total_requests: u64,
}

impl WorkerMetrics {
  pub fn record_request(&self) {
    self.total_requests.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_hit(&self) {
    self.cache_hits.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_miss(&self) {
    self.cache_misses.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_network(&self) {
    self.network_requests.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_offline(&self) {
    self.offline_requests.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> MetricsSnapshot {
    MetricsSnapshot {
      cache_hits: self.cache_hits.load(Ordering::Relaxed),
      cache_misses: self.cache_misses.load(Ordering::Relaxed),
      network_requests: self.network_requests.load(Ordering::Relaxed),
      offline_requests: self.offline_requests.load(Ordering::Relaxed),
      total_requests: self.total_requests.load(Ordering::Relaxed),
    }
  }

  pub fn reset(&self) {
    for counter in [
      &self.cache_hits,
      &self.cache_misses,
      &self.network_requests,
      &self.offline_requests,
      &self.total_requests,
    ] {
      counter.store(0, Ordering::Relaxed);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_snapshot_serializes_camel_case() {
    let metrics = WorkerMetrics::default();
    metrics.record_request();
    metrics.record_hit();

    let value = serde_json::to_value(metrics.snapshot()).unwrap();
    assert_eq!(
      value,
      json!({
        "cacheHits": 1,
        "cacheMisses": 0,
        "networkRequests": 0,
        "offlineRequests": 0,
        "totalRequests": 1
      })
    );

    metrics.reset();
    assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
  }
}
