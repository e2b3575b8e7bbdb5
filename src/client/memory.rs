//! In-memory TTL response cache.

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::clock::duration_ms;

/// A cached response payload. Entries are replaced, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub key: String,
  pub payload: Value,
  /// Epoch milliseconds at write time
  pub stored_at: i64,
  pub ttl: Option<Duration>,
}

impl CacheEntry {
  pub fn age_ms(&self, now_ms: i64) -> i64 {
    now_ms - self.stored_at
  }

  /// Expired once strictly older than its TTL.
  pub fn is_expired(&self, now_ms: i64) -> bool {
    match self.ttl {
      Some(ttl) => self.age_ms(now_ms) > duration_ms(ttl),
      None => false,
    }
  }
}

#[derive(Debug)]
struct Slot {
  entry: CacheEntry,
  /// Insertion order, breaks ties between equal `stored_at` values
  seq: u64,
}

#[derive(Debug)]
pub struct ResponseCache {
  entries: HashMap<String, Slot>,
  max_entries: usize,
  next_seq: u64,
  epoch: u64,
}

impl ResponseCache {
  pub fn new(max_entries: usize) -> Self {
    Self {
      entries: HashMap::new(),
      max_entries: max_entries.max(1),
      next_seq: 0,
      epoch: 0,
    }
  }

  /// Bumped by every `invalidate` and `clear`. A payload fetched under an
  /// older epoch may predate the write that caused the invalidation.
  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  /// Entry for `key` if it has not expired.
  pub fn get_fresh(&self, key: &str, now_ms: i64) -> Option<&CacheEntry> {
    self
      .entries
      .get(key)
      .map(|slot| &slot.entry)
      .filter(|e| !e.is_expired(now_ms))
  }

  /// Entry for `key` no older than `max_age`, expired or not.
  pub fn get_within(&self, key: &str, now_ms: i64, max_age: Duration) -> Option<&CacheEntry> {
    self
      .entries
      .get(key)
      .map(|slot| &slot.entry)
      .filter(|e| e.age_ms(now_ms) <= duration_ms(max_age))
  }

  /// Store an entry. Past capacity, expired entries are pruned first, then
  /// the oldest writes are evicted. The entry just written is never evicted.
  pub fn insert(&mut self, entry: CacheEntry, now_ms: i64) {
    let key = entry.key.clone();
    let seq = self.next_seq;
    self.next_seq += 1;
    self.entries.insert(key.clone(), Slot { entry, seq });

    if self.entries.len() > self.max_entries {
      self.prune_expired(now_ms);
    }

    while self.entries.len() > self.max_entries {
      let oldest = self
        .entries
        .iter()
        .filter(|(k, _)| **k != key)
        .min_by_key(|(_, slot)| (slot.entry.stored_at, slot.seq))
        .map(|(k, _)| k.clone());
      match oldest {
        Some(oldest) => {
          self.entries.remove(&oldest);
        }
        None => break,
      }
    }
  }

  /// Store an entry fetched under `epoch`, unless an invalidation happened
  /// since. Returns whether it was stored.
  pub fn insert_if_current(&mut self, entry: CacheEntry, now_ms: i64, epoch: u64) -> bool {
    if epoch != self.epoch {
      return false;
    }
    self.insert(entry, now_ms);
    true
  }

  /// Remove every entry whose key contains `pattern`.
  pub fn invalidate(&mut self, pattern: &str) -> usize {
    self.epoch += 1;
    let before = self.entries.len();
    self.entries.retain(|key, _| !key.contains(pattern));
    before - self.entries.len()
  }

  pub fn prune_expired(&mut self, now_ms: i64) -> usize {
    let before = self.entries.len();
    self.entries.retain(|_, slot| !slot.entry.is_expired(now_ms));
    before - self.entries.len()
  }

  pub fn clear(&mut self) {
    self.epoch += 1;
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
