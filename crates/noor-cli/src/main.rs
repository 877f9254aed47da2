//! Noor CLI - build-time and maintenance commands for the offline layer.
//!
//! Prints cache names and routing decisions for a build, renders the service
//! worker, and runs the storage janitor against an on-disk store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use noor_core::{
    render_service_worker_file, BuildVersion, CacheRegistry, IdentityHub, JanitorConfig,
    ResponseCache, SqliteCache, SqliteStore, StorageJanitor, StorageLifecycle, UserId,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "noor")]
#[command(about = "Cache versioning and storage cleanup for Noor")]
struct Args {
    /// Enable debug logging (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Key-value store database (defaults to the user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Janitor configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an existing version token instead of stamping a new one from NOOR_BUILD_ID
    #[arg(long, global = true)]
    version_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the version token for this build
    Version,
    /// Print cache names, policies and routes as JSON
    Manifest,
    /// Show how a request path is cached
    Route { path: String },
    /// Report storage usage against the quota ceiling
    Quota,
    /// Remove stale and foreign-user entries from the store
    Cleanup {
        /// Only remove entries owned by this user
        #[arg(long, conflicts_with = "deferred")]
        user: Option<String>,
        /// Currently signed-in user whose entries are kept
        #[arg(long)]
        active: Option<String>,
        /// Run the way an app mount does, after the initial cleanup delay
        #[arg(long)]
        deferred: bool,
    },
    /// Stamp the service worker template with version and manifest
    RenderSw {
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Delete cached responses that belong to other versions
    PurgeCaches {
        /// Response cache database
        #[arg(long)]
        cache_db: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.debug, args.log_json);

    match args.command {
        Command::Version => {
            println!("{}", build_version(args.version_token.as_deref())?);
        }
        Command::Manifest => {
            let registry = CacheRegistry::new(build_version(args.version_token.as_deref())?);
            print_json(&registry.manifest())?;
        }
        Command::Route { ref path } => {
            let registry = CacheRegistry::new(build_version(args.version_token.as_deref())?);
            let route = registry.route_for(path);
            print_json(&serde_json::json!({
                "path": path,
                "rule": route.rule,
                "strategy": route.strategy.to_string(),
                "category": route.category,
                "cache_name": route.cache_name,
            }))?;
        }
        Command::Quota => {
            let janitor = open_janitor(&args, None)?;
            print_json(&janitor.check_quota_usage())?;
        }
        Command::Cleanup {
            ref user,
            ref active,
            deferred,
        } => {
            let janitor = Arc::new(open_janitor(&args, active.as_deref())?);
            let result = if let Some(user) = user {
                janitor.cleanup_for_user(user)
            } else if deferred {
                let mount = StorageLifecycle::new(janitor).on_mount();
                mount
                    .finished()
                    .await
                    .context("Deferred cleanup did not complete")?
            } else {
                janitor.run_full_cleanup()
            };
            print_json(&result)?;
        }
        Command::RenderSw {
            ref template,
            ref out,
        } => {
            let registry = CacheRegistry::new(build_version(args.version_token.as_deref())?);
            let rendered = render_service_worker_file(template, out, &registry)?;
            print_json(&serde_json::json!({
                "version": registry.current_version(),
                "output": out,
                "content_hash": rendered.content_hash,
            }))?;
        }
        Command::PurgeCaches { ref cache_db } => {
            let registry = CacheRegistry::new(build_version(args.version_token.as_deref())?);
            let cache = ResponseCache::new(registry, SqliteCache::new(cache_db)?);
            let purged = cache.purge_orphaned_caches()?;
            let expired = cache.cleanup_expired()?;
            print_json(&serde_json::json!({
                "orphaned_namespaces": purged,
                "expired_entries": expired,
            }))?;
        }
    }

    Ok(())
}

fn log_filter(debug: bool) -> EnvFilter {
    let default_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

fn init_logging(debug: bool, json: bool) {
    let builder = FmtSubscriber::builder()
        .with_env_filter(log_filter(debug))
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn build_version(token: Option<&str>) -> Result<BuildVersion> {
    let version = match token {
        Some(token) => BuildVersion::parse(token)?,
        None => BuildVersion::from_env()?,
    };
    Ok(version)
}

fn load_config(path: Option<&Path>) -> Result<JanitorConfig> {
    let Some(path) = path else {
        return Ok(JanitorConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("No user data directory on this platform")?;
    Ok(data_dir.join("noor").join("storage.sqlite"))
}

fn open_janitor(args: &Args, active: Option<&str>) -> Result<StorageJanitor> {
    let db_path = match &args.db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    info!("Storage database: {}", db_path.display());

    let config = load_config(args.config.as_deref())?;
    let identity = active.map(|id| UserId::new(id)).transpose()?;
    let store = SqliteStore::new(&db_path)?;

    Ok(StorageJanitor::new(
        Arc::new(store),
        Arc::new(IdentityHub::with_identity(identity)),
        config,
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
