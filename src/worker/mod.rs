//! Offline worker.
//!
//! Sits between the application and the network and answers GET requests
//! from three named, generation-tagged stores:
//! - `static` for the app shell (cache-first)
//! - `api` for backend reads (per-endpoint rules)
//! - `media` for images and video (stale-while-revalidate)
//!
//! When neither network nor store can answer, the offline fallback chain
//! produces a deterministic response.

mod events;
mod fallback;
mod lifecycle;
mod messages;
mod metrics;
mod offline;
mod response;
mod routes;
mod served;
mod store;
mod strategy;

pub use events::{EventOutcome, Notification, PushPayload, WorkerEvent, SYNC_TAG};
pub use lifecycle::WorkerState;
pub use messages::{WorkerMessage, WorkerReply};
pub use metrics::{MetricsSnapshot, WorkerMetrics};
pub use offline::{OfflineWorker, WorkerSettings};
pub use response::{request_key, CachedHttpResponse, TIMESTAMP_HEADER};
pub use routes::{default_api_rules, CacheStrategyRule, ResourceClass, Route, RouteTable, StrategyKind};
pub use served::{CacheSource, Served};
pub use store::{CacheStorage, SqliteStorage, StoreKind, StoreNames};
