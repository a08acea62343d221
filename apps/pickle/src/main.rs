//! Pickle maintenance CLI.
//!
//! Two subcommands, both driven entirely by environment variables so they
//! can run from cron or a container without a config file:
//!
//! ```text
//! pickle maintain   # one maintenance pass over the primary bucket
//! pickle backup     # one convergence pass primary -> backup bucket
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `PICKLE_S3_URL` | Primary endpoint host\[:port\] |
//! | `PICKLE_S3_REGION` | Primary region |
//! | `PICKLE_S3_BUCKET` | Primary bucket |
//! | `PICKLE_S3_ACCESS_KEY_ID` | Primary access key |
//! | `PICKLE_S3_SECRET_ACCESS_KEY` | Primary secret key |
//! | `PICKLE_S3_STORAGE_CLASS` | Optional storage class for uploads |
//! | `PICKLE_S3_INSECURE` | `1`/`true` for plain HTTP (tests only) |
//! | `PICKLE_AGE_KEY` | age identity (`AGE-SECRET-KEY-1...`) |
//! | `PICKLE_OBJECT_LOCK_HOURS` | Retention window in hours |
//! | `PICKLE_BACKUP_S3_*` | Backup bucket, same names as `PICKLE_S3_*` |
//! | `LOG_LEVEL` | Log level filter (default `info`) |
//! | `RUST_LOG` | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//!
//! Exits 0 on success, 1 on any error.

use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use age::x25519::Identity;
use pickle_engine::{Engine, EngineConfig, run_backup};
use pickle_store::{ObjectStore, S3Config, S3ObjectStore, SystemClock};

/// Archive maintenance and backup for pickle buckets.
#[derive(Debug, Parser)]
#[command(name = "pickle", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one maintenance pass over the primary bucket.
    Maintain,
    /// Run one backup convergence pass from the primary bucket to the
    /// backup bucket.
    Backup,
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL`
/// environment variable, then to `info`.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Read one required environment variable.
fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} is not set"))
}

/// Read store connection settings from `{prefix}_*` environment variables.
fn load_store_config(prefix: &str) -> Result<S3Config> {
    Ok(S3Config {
        endpoint: env_var(&format!("{prefix}_URL"))?,
        region: env_var(&format!("{prefix}_REGION"))?,
        bucket: env_var(&format!("{prefix}_BUCKET"))?,
        access_key_id: env_var(&format!("{prefix}_ACCESS_KEY_ID"))?,
        secret_access_key: env_var(&format!("{prefix}_SECRET_ACCESS_KEY"))?,
        storage_class: std::env::var(format!("{prefix}_STORAGE_CLASS")).ok(),
        insecure: std::env::var(format!("{prefix}_INSECURE"))
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false),
    })
}

fn load_object_lock_hours() -> Result<i64> {
    let raw = env_var("PICKLE_OBJECT_LOCK_HOURS")?;
    let hours: i64 = raw
        .parse()
        .with_context(|| format!("PICKLE_OBJECT_LOCK_HOURS is not a number: {raw}"))?;
    if hours < 0 {
        return Err(anyhow!("PICKLE_OBJECT_LOCK_HOURS must be >= 0"));
    }
    Ok(hours)
}

fn load_identity() -> Result<Identity> {
    let raw = env_var("PICKLE_AGE_KEY")?;
    Identity::from_str(raw.trim()).map_err(|err| anyhow!("PICKLE_AGE_KEY is invalid: {err}"))
}

fn primary_store() -> Result<Arc<dyn ObjectStore>> {
    let config = load_store_config("PICKLE_S3")?;
    Ok(Arc::new(S3ObjectStore::new(&config)))
}

async fn maintain() -> Result<()> {
    let mut engine = Engine::new(EngineConfig {
        store: Some(primary_store()?),
        identity: Some(load_identity()?),
        object_lock_hours: load_object_lock_hours()?,
        clock: None,
    })?;
    engine.run_maintenance().await?;
    Ok(())
}

async fn backup() -> Result<()> {
    let source = primary_store()?;
    let target_config = load_store_config("PICKLE_BACKUP_S3")?;
    let target = S3ObjectStore::new(&target_config);
    let hours = load_object_lock_hours()?;

    run_backup(source.as_ref(), &target, hours, &SystemClock).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Maintain => maintain().await,
        Command::Backup => backup().await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
