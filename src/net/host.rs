use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;

/// Online/offline signal supplied by the hosting runtime.
pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> bool;
}

/// Connectivity state toggled by the host's online/offline events.
#[derive(Debug)]
pub struct ConnectivityFlag {
  online: AtomicBool,
}

impl ConnectivityFlag {
  pub fn new(online: bool) -> Self {
    Self {
      online: AtomicBool::new(online),
    }
  }

  /// Record a connectivity change. Returns true on an offline -> online
  /// transition, which is the host's cue to replay failed requests.
  pub fn set_online(&self, online: bool) -> bool {
    let was_online = self.online.swap(online, Ordering::SeqCst);
    online && !was_online
  }
}

impl Default for ConnectivityFlag {
  fn default() -> Self {
    Self::new(true)
  }
}

impl Connectivity for ConnectivityFlag {
  fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

/// Source of the opaque session token attached to every API call.
pub trait SessionProvider: Send + Sync {
  fn session_token(&self) -> Option<String>;
}

/// Reads the token from the environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSession;

impl SessionProvider for EnvSession {
  fn session_token(&self) -> Option<String> {
    Config::get_session_token()
  }
}

/// A fixed token.
#[derive(Debug, Clone, Default)]
pub struct StaticSession(pub Option<String>);

impl SessionProvider for StaticSession {
  fn session_token(&self) -> Option<String> {
    self.0.clone()
  }
}
