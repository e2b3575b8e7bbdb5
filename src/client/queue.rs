//! Bounded FIFO of requests that failed while offline.

use std::collections::VecDeque;

use super::error::ApiError;
use super::options::FetchOptions;

#[derive(Debug, Clone)]
pub struct FailedRequestRecord {
  pub endpoint: String,
  pub options: FetchOptions,
  pub error: ApiError,
  /// Epoch milliseconds of the (latest) failure
  pub timestamp: i64,
  pub retry_count: u32,
}

/// When full, the oldest record is dropped to make room.
#[derive(Debug)]
pub struct FailedRequestQueue {
  records: VecDeque<FailedRequestRecord>,
  capacity: usize,
  dropped: u64,
}

impl FailedRequestQueue {
  pub fn new(capacity: usize) -> Self {
    Self {
      records: VecDeque::new(),
      capacity: capacity.max(1),
      dropped: 0,
    }
  }

  /// Append a record; returns the evicted oldest record if the queue was full.
  pub fn push(&mut self, record: FailedRequestRecord) -> Option<FailedRequestRecord> {
    let evicted = if self.records.len() >= self.capacity {
      self.dropped += 1;
      self.records.pop_front()
    } else {
      None
    };
    self.records.push_back(record);
    evicted
  }

  /// Take every record, oldest first.
  pub fn drain(&mut self) -> Vec<FailedRequestRecord> {
    self.records.drain(..).collect()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Records evicted for lack of room since creation.
  pub fn dropped(&self) -> u64 {
    self.dropped
  }
}
