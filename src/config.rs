use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::worker::{CacheStrategyRule, StrategyKind};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub worker: WorkerConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Header carrying the host session token
  pub auth_header: String,
  pub client_version: String,
  /// Deadline for user-facing calls
  pub timeout_ms: u64,
  /// Upper bound for per-request timeout overrides
  pub max_timeout_ms: u64,
  pub default_cache_ttl_ms: u64,
  /// How old a cached read may be when served as an offline fallback
  pub stale_fallback_ms: u64,
  pub max_cache_entries: usize,
  pub failed_queue_capacity: usize,
  pub batch_concurrency: usize,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080".to_string(),
      auth_header: "X-Telegram-Auth".to_string(),
      client_version: env!("CARGO_PKG_VERSION").to_string(),
      timeout_ms: 15_000,
      max_timeout_ms: 30_000,
      default_cache_ttl_ms: 60_000,
      stale_fallback_ms: 3_600_000,
      max_cache_entries: 100,
      failed_queue_capacity: 50,
      batch_concurrency: 5,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub base_delay_ms: u64,
  pub multiplier: f64,
  pub max_delay_ms: u64,
  pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay_ms: 1_000,
      multiplier: 2.0,
      max_delay_ms: 30_000,
      retryable_statuses: vec![408, 429, 500, 502, 503, 504],
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Prefix shared by the three store names
  pub cache_prefix: String,
  /// Generation tag; bumping it evicts every store of the previous generation
  pub generation: String,
  pub origin: String,
  pub api_prefix: String,
  /// Entry page served to navigations while offline
  pub shell_page: String,
  pub static_manifest: Vec<String>,
  pub api_rules: Vec<CacheStrategyRule>,
  pub default_api_rule: CacheStrategyRule,
  /// Keep stores on disk; otherwise they live for the process only
  pub persistent: bool,
  pub app_name: String,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      cache_prefix: "service-crym".to_string(),
      generation: "v3.0".to_string(),
      origin: "http://localhost:8080".to_string(),
      api_prefix: "/api/".to_string(),
      shell_page: "/index.html".to_string(),
      static_manifest: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/config.js".to_string(),
        "/manifest.json".to_string(),
        "https://telegram.org/js/telegram-web-app.js".to_string(),
      ],
      api_rules: crate::worker::default_api_rules(),
      default_api_rule: CacheStrategyRule {
        pattern: String::new(),
        strategy: StrategyKind::NetworkFirst,
        max_age_ms: Some(60_000),
      },
      persistent: true,
      app_name: "Service-Crym".to_string(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
  #[default]
  Human,
  Json,
  Compact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Level for this crate when RUST_LOG is unset
  pub level: String,
  pub format: LogFormat,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      format: LogFormat::Human,
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./crymnet.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/crymnet/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("crymnet.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("crymnet").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.retry.multiplier < 1.0 {
      return Err(eyre!(
        "retry.multiplier must be >= 1.0 (got {})",
        self.retry.multiplier
      ));
    }
    if self.api.timeout_ms == 0 {
      return Err(eyre!("api.timeout_ms must be positive"));
    }
    if self.api.batch_concurrency == 0 {
      return Err(eyre!("api.batch_concurrency must be positive"));
    }
    Ok(())
  }

  /// Get the session token from environment variables.
  ///
  /// Checks CRYMNET_SESSION_TOKEN first, then TELEGRAM_INIT_DATA as fallback.
  pub fn get_session_token() -> Option<String> {
    std::env::var("CRYMNET_SESSION_TOKEN")
      .or_else(|_| std::env::var("TELEGRAM_INIT_DATA"))
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
