use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crymnet::client::{ClientSettings, FetchOptions, RequestCache, Statistics};
use crymnet::config::Config;
use crymnet::net::ReqwestTransport;
use crymnet::worker::{CacheStorage, OfflineWorker, SqliteStorage, WorkerSettings};

type Worker = OfflineWorker<ReqwestTransport, SqliteStorage>;

#[derive(Parser, Debug)]
#[command(name = "crymnet")]
#[command(about = "Offline-capable API client for the Service-Crym backend")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/crymnet/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Backend base URL, overrides api.base_url
  #[arg(short, long)]
  base_url: Option<String>,

  /// Print request statistics to stderr when done
  #[arg(long)]
  stats: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch an endpoint through the cache and print its data
  Get(GetArgs),
  /// Send a mutation, then invalidate affected cache entries
  Send(SendArgs),
  /// Drive the offline worker
  #[command(subcommand)]
  Worker(WorkerCommand),
}

#[derive(ClapArgs, Debug)]
struct GetArgs {
  endpoint: String,

  /// Bypass the response cache
  #[arg(long)]
  no_cache: bool,

  /// Cache TTL in milliseconds
  #[arg(long)]
  ttl_ms: Option<u64>,
}

#[derive(ClapArgs, Debug)]
struct SendArgs {
  /// HTTP method (POST, PUT, PATCH, DELETE)
  method: String,
  endpoint: String,

  /// JSON request body
  #[arg(long)]
  body: Option<String>,

  /// Cache key pattern to invalidate on success (repeatable)
  #[arg(long = "invalidate")]
  invalidate: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum WorkerCommand {
  /// Precache the shell manifest
  Install,
  /// Install if needed, then activate and evict old generations
  Activate,
  /// Print the worker metrics
  Metrics,
  /// Delete every store
  Clear,
  /// List stores with their entry counts
  Stores,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(base_url) = args.base_url {
    config.worker.origin = base_url.clone();
    config.api.base_url = base_url;
  }

  let _log_guard = crymnet::logging::init(&config.logging)?;

  let storage = if config.worker.persistent {
    SqliteStorage::open()?
  } else {
    SqliteStorage::open_in_memory()?
  };
  let worker = OfflineWorker::new(
    ReqwestTransport::new()?,
    storage,
    WorkerSettings::from_config(&config.worker)?,
  );

  match args.command {
    Command::Worker(command) => run_worker(&worker, command).await?,
    command => {
      if let Err(e) = worker.start().await {
        warn!(error = %e, "worker not active, requests go straight to the network");
      }

      let settings = ClientSettings::from_config(&config.api, &config.retry)?;
      let cache = RequestCache::new(worker.clone(), settings);
      let result = run_request(&cache, command).await;
      let stats = args.stats.then(|| cache.statistics());
      let data = report_stats(result, stats.as_ref(), &mut std::io::stderr())?;
      print_json(&data)?;
    }
  }

  Ok(())
}

async fn run_request(cache: &RequestCache<Worker>, command: Command) -> Result<Value> {
  let result = match command {
    Command::Get(get) => {
      let mut options = FetchOptions::get().with_cache(!get.no_cache);
      if let Some(ttl) = get.ttl_ms {
        options = options.with_ttl(Duration::from_millis(ttl));
      }
      cache.fetch(&get.endpoint, options).await
    }
    Command::Send(send) => {
      let method = Method::from_bytes(send.method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method {}: {}", send.method, e))?;
      let body = send
        .body
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .map_err(|e| eyre!("Invalid JSON body: {}", e))?;

      let options = send
        .invalidate
        .into_iter()
        .fold(FetchOptions::with_method(method, body), |options, pattern| {
          options.invalidating(pattern)
        });
      cache.fetch(&send.endpoint, options).await
    }
    Command::Worker(_) => return Err(eyre!("not a request command")),
  };

  result.map_err(|e| match e.data() {
    Some(data) => eyre!("{} (status {}): {}", e, e.status(), data),
    None => eyre!("{} (status {})", e, e.status()),
  })
}

async fn run_worker(worker: &Worker, command: WorkerCommand) -> Result<()> {
  match command {
    WorkerCommand::Install => {
      worker.install().await?;
      print_json(&json!({"state": worker.state()}))
    }
    WorkerCommand::Activate => {
      let deleted = worker.start().await?;
      print_json(&json!({"state": worker.state(), "deleted": deleted}))
    }
    WorkerCommand::Metrics => {
      let reply = worker.handle_message(&json!({"type": "GET_METRICS"}))?;
      print_json(&serde_json::to_value(reply)?)
    }
    WorkerCommand::Clear => {
      let reply = worker.handle_message(&json!({"type": "CLEAR_CACHE"}))?;
      print_json(&serde_json::to_value(reply)?)
    }
    WorkerCommand::Stores => {
      let storage = worker.storage();
      let mut stores = serde_json::Map::new();
      for name in storage.store_names()? {
        let count = storage.entry_count(&name)?;
        stores.insert(name, json!(count));
      }
      print_json(&Value::Object(stores))
    }
  }
}

/// Write `stats` to `out`, failed request or not, then hand back the result.
fn report_stats(
  result: Result<Value>,
  stats: Option<&Statistics>,
  out: &mut impl Write,
) -> Result<Value> {
  if let Some(stats) = stats {
    writeln!(out, "{}", serde_json::to_string_pretty(stats)?)?;
  }
  result
}

fn print_json(value: &Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
