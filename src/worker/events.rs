//! Events delivered to the worker by its host, and what the host should do
//! in response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lifecycle::WorkerState;
use super::messages::WorkerReply;
use super::served::Served;
use crate::net::{HttpRequest, TransportError};

pub const SYNC_TAG: &str = "background-sync";
const DEFAULT_BODY: &str = "New notification";
const DEFAULT_TAG: &str = "general";
const ICON: &str = "/icons/icon-192x192.png";
const BADGE: &str = "/icons/icon-72x72.png";

#[derive(Debug, Clone)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(HttpRequest),
  Message(Value),
  /// Raw push data, if the push carried any
  Push(Option<Vec<u8>>),
  NotificationClick(Notification),
  Sync(String),
}

#[derive(Debug)]
pub enum EventOutcome {
  Lifecycle(WorkerState),
  Response(Result<Served, TransportError>),
  Reply(Option<WorkerReply>),
  ShowNotification(Notification),
  OpenWindow(String),
  /// The host should replay its failed-request queue
  ReplayFailedRequests,
  Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub tag: Option<String>,
  pub require_interaction: bool,
  pub actions: Vec<Value>,
  pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub require_interaction: bool,
  pub actions: Vec<Value>,
  pub url: Option<String>,
}

impl Notification {
  pub fn from_push(payload: PushPayload, app_name: &str) -> Self {
    Self {
      title: payload.title.unwrap_or_else(|| app_name.to_string()),
      body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
      icon: ICON.to_string(),
      badge: BADGE.to_string(),
      tag: payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
      require_interaction: payload.require_interaction,
      actions: payload.actions,
      url: payload.url,
    }
  }

  /// Where a click on this notification navigates.
  pub fn click_target(&self) -> &str {
    self.url.as_deref().unwrap_or("/")
  }
}
