use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetrics {
  pub total_requests: u64,
  pub successful_requests: u64,
  pub failed_requests: u64,
  pub cache_hits: u64,
  /// Rolling mean over successful network calls
  pub average_response_time_ms: f64,
}

impl ClientMetrics {
  pub fn record_cache_hit(&mut self) {
    self.total_requests += 1;
    self.cache_hits += 1;
  }

  pub fn record_success(&mut self, latency: Duration) {
    self.total_requests += 1;
    self.successful_requests += 1;
    let n = self.successful_requests as f64;
    let sample = latency.as_secs_f64() * 1_000.0;
    self.average_response_time_ms = (self.average_response_time_ms * (n - 1.0) + sample) / n;
  }

  pub fn record_failure(&mut self) {
    self.total_requests += 1;
    self.failed_requests += 1;
  }
}

/// Snapshot returned by [`super::RequestCache::statistics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
  #[serde(flatten)]
  pub metrics: ClientMetrics,
  pub cache_size: usize,
  pub pending_requests: usize,
  pub failed_requests_count: usize,
  /// Percentages, 0 when nothing was requested yet
  pub success_rate: f64,
  pub cache_hit_rate: f64,
}

impl Statistics {
  pub fn new(
    metrics: ClientMetrics,
    cache_size: usize,
    pending_requests: usize,
    failed_requests_count: usize,
  ) -> Self {
    let percent = |part: u64| {
      if metrics.total_requests == 0 {
        0.0
      } else {
        part as f64 / metrics.total_requests as f64 * 100.0
      }
    };
    let success_rate = percent(metrics.successful_requests + metrics.cache_hits);
    let cache_hit_rate = percent(metrics.cache_hits);

    Self {
      metrics,
      cache_size,
      pending_requests,
      failed_requests_count,
      success_rate,
      cache_hit_rate,
    }
  }
}
