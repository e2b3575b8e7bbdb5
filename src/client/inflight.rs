//! Single-flight registry: at most one in-flight operation per request key
//! and cache epoch. A caller arriving after an invalidation never joins an
//! operation started before it.
//!
//! The operation runs as its own task so that it always settles (and always
//! deregisters) even if every caller stops waiting. Waiters share the result
//! through a [`Shared`] future over the task's join handle.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tracing::trace;

use super::error::ApiError;

pub type SharedResult = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

struct Flight {
  id: u64,
  shared: SharedResult,
  abort: AbortHandle,
}

#[derive(Default)]
pub struct InFlight {
  flights: Mutex<HashMap<(String, u64), Flight>>,
  next_id: AtomicU64,
}

impl InFlight {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// The pending operation for `key` started under `epoch`, if one is running.
  pub fn get(&self, key: &str, epoch: u64) -> Option<SharedResult> {
    self
      .lock()
      .get(&(key.to_string(), epoch))
      .map(|f| f.shared.clone())
  }

  /// Join the pending operation for `key` under `epoch`, or spawn `op` as
  /// the new one.
  pub fn join_or_start<F>(self: &Arc<Self>, key: &str, epoch: u64, op: F) -> SharedResult
  where
    F: Future<Output = Result<Value, ApiError>> + Send + 'static,
  {
    let slot = (key.to_string(), epoch);
    let mut flights = self.lock();
    if let Some(flight) = flights.get(&slot) {
      trace!(key, "joining in-flight request");
      return flight.shared.clone();
    }

    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let guard = FlightGuard {
      registry: Arc::clone(self),
      slot: slot.clone(),
      id,
    };
    let handle = tokio::spawn(async move {
      let _guard = guard;
      op.await
    });
    let abort = handle.abort_handle();

    let shared = handle
      .map(|joined| match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(ApiError::Cancelled),
        Err(e) => Err(ApiError::Internal(format!("request task failed: {}", e))),
      })
      .boxed()
      .shared();

    flights.insert(
      slot,
      Flight {
        id,
        shared: shared.clone(),
        abort,
      },
    );
    shared
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// Abort every running operation. Returns how many were aborted.
  pub fn cancel_all(&self) -> usize {
    let drained: Vec<Flight> = self.lock().drain().map(|(_, flight)| flight).collect();
    for flight in &drained {
      flight.abort.abort();
    }
    drained.len()
  }

  fn finish(&self, slot: &(String, u64), id: u64) {
    let mut flights = self.lock();
    if flights.get(slot).map(|f| f.id) == Some(id) {
      flights.remove(slot);
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<(String, u64), Flight>> {
    self.flights.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Deregisters its flight when the operation settles or is dropped.
struct FlightGuard {
  registry: Arc<InFlight>,
  slot: (String, u64),
  id: u64,
}

impl Drop for FlightGuard {
  fn drop(&mut self) {
    self.registry.finish(&self.slot, self.id);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  #[tokio::test]
  async fn test_concurrent_callers_share_one_operation() {
    let registry = InFlight::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let mut waiters = Vec::new();
    for _ in 0..5 {
      let runs = Arc::clone(&runs);
      waiters.push(registry.join_or_start("GET:/api/orders:{}", 0, async move {
        runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(json!([1, 2]))
      }));
    }

    for waiter in waiters {
      assert_eq!(waiter.await.unwrap(), json!([1, 2]));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
  }

  #[tokio::test]
  async fn test_failure_deregisters() {
    let registry = InFlight::new();
    let result = registry
      .join_or_start("k", 0, async { Err(ApiError::offline("down")) })
      .await;
    assert!(result.is_err());
    assert!(registry.get("k", 0).is_none());
  }

  #[tokio::test]
  async fn test_dropped_waiters_still_settle() {
    let registry = InFlight::new();
    drop(registry.join_or_start("k", 0, async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      Ok(Value::Null)
    }));
    assert_eq!(registry.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(registry.is_empty());
  }

  #[tokio::test]
  async fn test_cancel_all_reports_cancelled() {
    let registry = InFlight::new();
    let waiter = registry.join_or_start("k", 0, async {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Ok(Value::Null)
    });

    assert_eq!(registry.cancel_all(), 1);
    assert_eq!(waiter.await, Err(ApiError::Cancelled));
    assert!(registry.is_empty());
  }

  #[tokio::test]
  async fn test_newer_epoch_starts_its_own_operation() {
    let registry = InFlight::new();
    let old = registry.join_or_start("k", 0, async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok(json!("old"))
    });

    assert!(registry.get("k", 1).is_none());
    let new = registry.join_or_start("k", 1, async { Ok(json!("new")) });
    assert_eq!(registry.len(), 2);

    assert_eq!(new.await.unwrap(), json!("new"));
    assert_eq!(old.await.unwrap(), json!("old"));
    assert!(registry.is_empty());
  }
}
