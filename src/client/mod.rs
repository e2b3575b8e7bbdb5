//! Page-side request cache.
//!
//! This module provides the single chokepoint for outgoing API calls:
//! - Identical concurrent calls share one network operation (single-flight)
//! - Successful reads are cached in memory with a TTL
//! - Transient failures are retried with exponential backoff
//! - Mutations that fail while offline are queued and replayed on reconnect

mod envelope;
mod error;
mod inflight;
mod key;
mod memory;
mod metrics;
mod options;
mod queue;
mod request_cache;
mod retry;
mod settings;

pub use envelope::{decode, Envelope};
pub use error::ApiError;
pub use key::{normalize_endpoint, RequestKey};
pub use memory::{CacheEntry, ResponseCache};
pub use metrics::{ClientMetrics, Statistics};
pub use options::FetchOptions;
pub use queue::{FailedRequestQueue, FailedRequestRecord};
pub use request_cache::{ReplayReport, RequestCache, RequestCacheBuilder};
pub use retry::RetryPolicy;
pub use settings::ClientSettings;
