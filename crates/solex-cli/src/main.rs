//! solex - command-line driver for the SOLEX LOGISTICS site runtime.
//!
//! Worker commands run the cache manager against the configured origin with
//! bucket files under the user cache directory. `motion` replays a scripted
//! scroll session through the animation dispatcher.

mod scenario;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use solex_core::config::SiteConfig;
use solex_core::utils::{age_since, format_bytes, truncate};
use solex_core::worker::{
    self, CacheManager, CacheStorage, DiskStorage, HttpNetwork, Request, SyncOutcome, Url,
    WorkerHandle, WorkerMessage, CONTACT_FORM_SYNC_TAG,
};

// ============================================================================
// Constants
// ============================================================================

/// File name prefix for daily log files
const LOG_FILE_PREFIX: &str = "solex.log";

/// Display width of the bucket name column in `caches`
const BUCKET_COLUMN_WIDTH: usize = 40;

type DiskWorker = CacheManager<DiskStorage, HttpNetwork>;

#[derive(Debug, Parser)]
#[command(name = "solex", version, about = "SOLEX LOGISTICS offline worker and animation tools")]
struct Cli {
    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Precache the manifest into this version's bucket, then activate it
    Install,
    /// Delete buckets left behind by other versions
    Activate,
    /// Answer one request through the worker
    Fetch {
        /// Site-relative path, e.g. /css/style.css
        path: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        document: bool,
    },
    /// List cache buckets
    Caches,
    /// Print the notification a push message would raise
    Push {
        /// Message text; the default notice is used when omitted
        text: Option<String>,
    },
    /// Post a JSON message to the worker, e.g. {"type":"SKIP_WAITING"}
    Message { json: String },
    /// Fire a background sync tag
    Sync {
        #[arg(default_value = CONTACT_FORM_SYNC_TAG)]
        tag: String,
    },
    /// Replay a scroll scenario through the animation dispatcher
    Motion {
        /// JSON file with a page description and scroll steps
        scenario: PathBuf,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`). With a log
/// directory configured, a daily-rolling file receives the same events; the
/// returned guard must live until exit so buffered lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let _guard = init_tracing(config.log_dir.as_deref());
    info!(command = ?cli.command, "solex starting");

    match cli.command {
        Command::Install => install(&config).await,
        Command::Activate => {
            let (manager, handle) = start_worker(&config)?;
            if !manager.resume()? {
                anyhow::bail!(
                    "No bucket {} found; run `solex install` first",
                    manager.bucket_name()
                );
            }
            activate(&handle).await
        }
        Command::Fetch { path, document } => fetch(&config, &path, document).await,
        Command::Caches => list_caches(&config),
        Command::Push { text } => {
            let (_, handle) = start_worker(&config)?;
            let notification = handle.push(text).await?;
            println!("{}", serde_json::to_string_pretty(&notification)?);
            Ok(())
        }
        Command::Message { json } => {
            let (_, handle) = start_worker(&config)?;
            match handle.message(&json).await? {
                WorkerMessage::SkipWaiting => println!("Skip waiting requested"),
            }
            Ok(())
        }
        Command::Sync { tag } => {
            let (_, handle) = start_worker(&config)?;
            match handle.sync(&tag).await? {
                SyncOutcome::Completed => println!("Sync {} completed", tag),
                SyncOutcome::Ignored => println!("Sync {} ignored", tag),
            }
            Ok(())
        }
        Command::Motion { scenario } => scenario::run(&scenario).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<SiteConfig> {
    match path {
        Some(path) => {
            let mut config = SiteConfig::load_from(path)?;
            config.apply_env();
            Ok(config)
        }
        None => SiteConfig::load(),
    }
}

/// Build a disk-backed manager and start its event loop.
fn start_worker(config: &SiteConfig) -> Result<(Arc<DiskWorker>, WorkerHandle)> {
    let origin = Url::parse(&config.origin)
        .with_context(|| format!("Invalid origin: {}", config.origin))?;
    let storage = DiskStorage::new(config.cache_dir()?).context("Failed to open bucket storage")?;
    let network = HttpNetwork::new(origin).context("Failed to build HTTP client")?;
    let manager = Arc::new(CacheManager::new(config, storage, network)?);
    let handle = worker::runtime::spawn(Arc::clone(&manager));
    Ok((manager, handle))
}

async fn install(config: &SiteConfig) -> Result<()> {
    let (_, handle) = start_worker(config)?;
    let report = handle.install().await?;
    println!("Cached {} files into {}", report.cached, report.bucket);
    activate(&handle).await
}

async fn fetch(config: &SiteConfig, path: &str, document: bool) -> Result<()> {
    let (manager, handle) = start_worker(config)?;
    let mut request = manager.request_for(path)?;
    if document {
        request = Request::navigate(request.url);
    }

    let fetched = handle.fetch(request).await?;
    println!(
        "{} {} {} {} {}{}",
        fetched.source,
        fetched.response.status,
        fetched.response.status_text,
        fetched.response.header("content-type").unwrap_or("-"),
        format_bytes(fetched.response.body.len()),
        if fetched.stored { " (stored)" } else { "" }
    );
    Ok(())
}

async fn activate(handle: &WorkerHandle) -> Result<()> {
    let report = handle.activate().await?;
    for name in &report.deleted {
        println!("Deleted old cache {}", name);
    }
    println!("Activated {}", report.bucket);
    Ok(())
}

fn list_caches(config: &SiteConfig) -> Result<()> {
    let storage = DiskStorage::new(config.cache_dir()?).context("Failed to open bucket storage")?;
    let current = config.bucket_name();

    let names = storage.keys()?;
    if names.is_empty() {
        println!("No caches");
        return Ok(());
    }
    for name in names {
        let marker = if name == current { "*" } else { " " };
        let detail = match storage.info(&name) {
            Ok(Some(info)) => format!("{:>5} entries  {}", info.entries, age_since(info.created_at)),
            Ok(None) => continue,
            Err(e) => {
                warn!(cache = %name, error = %e, "Unreadable bucket");
                "unreadable".to_string()
            }
        };
        println!(
            "{} {:<width$} {}",
            marker,
            truncate(&name, BUCKET_COLUMN_WIDTH),
            detail,
            width = BUCKET_COLUMN_WIDTH
        );
    }
    Ok(())
}
