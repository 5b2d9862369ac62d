use std::env;

use crate::config::Config;
use color_eyre::{eyre::bail, Result};
use cryptio_core::config::{Options, Passphrase, StorageKind, DEFAULT_STORAGE};
use cryptio_storage::SecureStorage;
use tracing::debug;

/// Environment variable that supplies the passphrase, overriding the file.
pub const PASSPHRASE_ENV: &str = "CRYPTIO_PASSPHRASE";

/// Layer command-line and environment overrides over the config file.
pub fn layered_options(
    config: &Config,
    passphrase: Option<String>,
    storage: Option<String>,
) -> Options {
    Options {
        passphrase: passphrase.filter(|p| !p.is_empty()).map(Passphrase::new),
        storage,
        ..Options::default()
    }
    .merge(config.options.clone())
}

/// Options for this process: config file, then `CRYPTIO_PASSPHRASE`, then flags.
pub fn options_from_env(config: &Config, storage: Option<String>) -> Options {
    layered_options(config, env::var(PASSPHRASE_ENV).ok(), storage)
}

/// Without a passphrase the keys are random, and nothing written now could
/// be read by a later run.
pub fn require_passphrase(options: &Options) -> Result<()> {
    if options.passphrase.as_ref().is_some_and(|p| !p.is_empty()) {
        return Ok(());
    }
    bail!("no passphrase configured: set {PASSPHRASE_ENV} or `passphrase` in the config file")
}

/// Session and cookie backends live in memory and vanish when the process exits.
pub fn require_persistent(options: &Options) -> Result<()> {
    let kind: StorageKind = options
        .storage
        .as_deref()
        .unwrap_or(DEFAULT_STORAGE)
        .parse()?;
    if kind == StorageKind::Local {
        return Ok(());
    }
    bail!("{kind} storage does not outlive a single command; only `health` can use it")
}

/// Open the store for `health`: any backend, but a real passphrase.
pub async fn open(config: &Config, storage: Option<String>) -> Result<SecureStorage> {
    initialize(options_from_env(config, storage), false).await
}

/// Open the store for `set`/`get`/`remove`, which must survive across runs.
pub async fn open_persistent(config: &Config, storage: Option<String>) -> Result<SecureStorage> {
    initialize(options_from_env(config, storage), true).await
}

async fn initialize(options: Options, persistent: bool) -> Result<SecureStorage> {
    require_passphrase(&options)?;
    if persistent {
        require_persistent(&options)?;
    }
    debug!(storage = ?options.storage, "opening secure storage");
    Ok(SecureStorage::initialize(options).await?)
}

/// Helper for tests: a passphrase-protected local store rooted at `root`.
#[cfg(test)]
pub async fn test_storage(root: impl Into<std::path::PathBuf>) -> SecureStorage {
    let config = Config {
        options: Options {
            data_dir: Some(root.into()),
            ..Options::default()
        },
    };
    initialize(layered_options(&config, Some("p@ss".into()), None), true)
        .await
        .expect("test storage")
}
