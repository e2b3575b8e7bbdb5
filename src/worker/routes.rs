//! Request classification: which strategy and which store serve a URL.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::store::StoreKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

/// Path pattern (substring match) mapped to a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStrategyRule {
  pub pattern: String,
  pub strategy: StrategyKind,
  #[serde(default)]
  pub max_age_ms: Option<u64>,
}

impl CacheStrategyRule {
  pub fn new(pattern: impl Into<String>, strategy: StrategyKind, max_age_ms: Option<u64>) -> Self {
    Self {
      pattern: pattern.into(),
      strategy,
      max_age_ms,
    }
  }

  pub fn max_age(&self) -> Option<Duration> {
    self.max_age_ms.map(Duration::from_millis)
  }
}

pub fn default_api_rules() -> Vec<CacheStrategyRule> {
  vec![
    CacheStrategyRule::new(
      "/api/user/profile",
      StrategyKind::StaleWhileRevalidate,
      Some(300_000),
    ),
    CacheStrategyRule::new("/api/user/orders", StrategyKind::NetworkFirst, Some(60_000)),
    CacheStrategyRule::new("/api/admin/orders", StrategyKind::NetworkFirst, Some(30_000)),
    CacheStrategyRule::new(
      "/api/admin/clients",
      StrategyKind::StaleWhileRevalidate,
      Some(300_000),
    ),
  ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
  Static,
  Api,
  Media,
  Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
  pub class: ResourceClass,
  pub strategy: StrategyKind,
  pub store: StoreKind,
  pub max_age: Option<Duration>,
}

const MEDIA_EXTENSIONS: &[&str] = &[
  "jpg", "jpeg", "png", "gif", "webp", "svg", "mp4", "webm", "ogg",
];

#[derive(Debug, Clone)]
pub struct RouteTable {
  api_prefix: String,
  api_rules: Vec<CacheStrategyRule>,
  default_api_rule: CacheStrategyRule,
}

impl RouteTable {
  pub fn new(
    api_prefix: impl Into<String>,
    api_rules: Vec<CacheStrategyRule>,
    default_api_rule: CacheStrategyRule,
  ) -> Self {
    Self {
      api_prefix: api_prefix.into(),
      api_rules,
      default_api_rule,
    }
  }

  /// First match wins: static, api, media, other.
  pub fn classify(&self, url: &Url) -> ResourceClass {
    let path = url.path();
    if is_static(path) {
      ResourceClass::Static
    } else if self.is_api(url) {
      ResourceClass::Api
    } else if is_media(path) {
      ResourceClass::Media
    } else {
      ResourceClass::Other
    }
  }

  pub fn route(&self, url: &Url) -> Route {
    match self.classify(url) {
      ResourceClass::Static => Route {
        class: ResourceClass::Static,
        strategy: StrategyKind::CacheFirst,
        store: StoreKind::Static,
        max_age: None,
      },
      ResourceClass::Api => {
        let rule = self.api_rule(url.path());
        Route {
          class: ResourceClass::Api,
          strategy: rule.strategy,
          store: StoreKind::Api,
          max_age: rule.max_age(),
        }
      }
      ResourceClass::Media => Route {
        class: ResourceClass::Media,
        strategy: StrategyKind::StaleWhileRevalidate,
        store: StoreKind::Media,
        max_age: None,
      },
      ResourceClass::Other => Route {
        class: ResourceClass::Other,
        strategy: StrategyKind::NetworkFirst,
        store: StoreKind::Static,
        max_age: None,
      },
    }
  }

  pub fn is_api(&self, url: &Url) -> bool {
    url.path().starts_with(&self.api_prefix)
  }

  fn api_rule(&self, path: &str) -> &CacheStrategyRule {
    self
      .api_rules
      .iter()
      .find(|rule| path.contains(&rule.pattern))
      .unwrap_or(&self.default_api_rule)
  }
}

fn is_static(path: &str) -> bool {
  path == "/"
    || [".html", ".js", ".css", ".json"]
      .iter()
      .any(|ext| path.ends_with(ext))
    || path.contains("telegram-web-app.js")
}

fn is_media(path: &str) -> bool {
  if path.contains("/media/") {
    return true;
  }
  path
    .rsplit_once('.')
    .map(|(_, ext)| {
      let ext = ext.to_ascii_lowercase();
      MEDIA_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}
