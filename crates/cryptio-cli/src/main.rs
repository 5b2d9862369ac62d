mod cli;
mod config;
mod storage;

use std::sync::Arc;

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use cryptio_core::config::OutputEncoding;
use cryptio_storage::{
    provider::Hashing, EnvironmentFingerprint, KeyManager, RustCryptoProvider, SecureStorage,
};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const HEALTH_PROBE_KEY: &str = "cryptio/health-probe";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        cli::Command::Set { key, json } => {
            let storage = storage::open_persistent(&config, cli.storage).await?;
            run_set(&storage, &key, &json).await?;
            println!("Stored {key}");
        }
        cli::Command::Get { key } => {
            let storage = storage::open_persistent(&config, cli.storage).await?;
            let value = run_get(&storage, &key).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        cli::Command::Remove { key } => {
            let storage = storage::open_persistent(&config, cli.storage).await?;
            storage.remove(&key)?;
            println!("Removed {key}");
        }
        cli::Command::Health => {
            let storage = storage::open(&config, cli.storage).await?;
            run_health_check(&storage).await?;
            println!("Storage ({}): ok", storage.kind());
            println!("Key id: {}", storage.key_id());
            println!("Remaining capacity: {} bytes", storage.remaining_capacity()?);
        }
        cli::Command::Fingerprint => print_fingerprint(&config, cli.storage).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config()?,
        cli::Command::Version => print_version(),
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("cryptio {}", env!("CARGO_PKG_VERSION"));
}

async fn run_set(storage: &SecureStorage, key: &str, json: &str) -> Result<()> {
    let value: Value = serde_json::from_str(json).wrap_err("value must be valid JSON")?;
    storage.set(key, &value).await?;
    Ok(())
}

async fn run_get(storage: &SecureStorage, key: &str) -> Result<Value> {
    Ok(storage.get(key).await?)
}

/// Store, read back and delete a probe value.
async fn run_health_check(storage: &SecureStorage) -> Result<()> {
    let probe = json!({ "ok": true });
    storage.set(HEALTH_PROBE_KEY, &probe).await?;
    let round_trip: Value = storage.get(HEALTH_PROBE_KEY).await?;
    storage.remove(HEALTH_PROBE_KEY)?;

    if round_trip != probe {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

async fn print_fingerprint(config: &config::Config, storage: Option<String>) -> Result<()> {
    let settings = storage::options_from_env(config, storage).resolve()?;
    let hashing: Hashing = settings.crypto.hashing.parse()?;
    let manager = KeyManager::new(
        Arc::new(RustCryptoProvider),
        Arc::new(EnvironmentFingerprint),
    );
    let fingerprint = manager.machine_fingerprint(hashing).await?;
    println!(
        "{} {}",
        hashing.name(),
        OutputEncoding::Base64Url.encode(&fingerprint)
    );
    Ok(())
}

fn init_config() -> Result<()> {
    let path = config::write_default_if_missing(&config::Config::starter())?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
