//! What the worker answered with, and where the answer came from.

use crate::net::HttpResponse;

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// From a store, within its max age
  CacheFresh,
  /// From a store, past its max age, because the network failed
  CacheStale,
  /// Produced by the offline fallback chain
  Offline,
  /// Not intercepted: sent straight to the network
  PassThrough,
}

#[derive(Debug, Clone)]
pub struct Served {
  pub response: HttpResponse,
  pub source: CacheSource,
}

impl Served {
  pub fn from_network(response: HttpResponse) -> Self {
    Self {
      response,
      source: CacheSource::Network,
    }
  }

  pub fn from_cache(response: HttpResponse, is_stale: bool) -> Self {
    Self {
      response,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
    }
  }

  pub fn offline(response: HttpResponse) -> Self {
    Self {
      response,
      source: CacheSource::Offline,
    }
  }

  pub fn pass_through(response: HttpResponse) -> Self {
    Self {
      response,
      source: CacheSource::PassThrough,
    }
  }

  pub fn is_from_cache(&self) -> bool {
    matches!(self.source, CacheSource::CacheFresh | CacheSource::CacheStale)
  }
}
