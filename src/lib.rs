//! Offline-capable network cache layer for the Service-Crym mini-app client.
//!
//! Two cooperating pieces:
//! - [`client::RequestCache`]: the page-side chokepoint for API calls, with
//!   single-flight deduplication, a TTL response cache, retries with
//!   exponential backoff and a replay queue for requests that failed offline.
//! - [`worker::OfflineWorker`]: the background interceptor that routes every
//!   fetch to a caching strategy over three generation-named persistent stores
//!   and answers with a structured offline response when everything fails.
//!
//! The worker implements [`net::Transport`] itself, so the usual stack is
//! `RequestCache<OfflineWorker<ReqwestTransport, SqliteStorage>>`.

pub mod client;
pub mod clock;
pub mod config;
pub mod logging;
pub mod net;
pub mod worker;
