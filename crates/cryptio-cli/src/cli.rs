use clap::{Parser, Subcommand};

/// Command-line front end to the encrypted store.
#[derive(Parser, Debug)]
#[command(
    name = "cryptio",
    about = "Encrypted, tamper-evident key/value storage",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Backend to use for this invocation (local, session or cookie).
    /// Session and cookie storage live in memory, so only `health` accepts them.
    #[arg(long, global = true)]
    pub storage: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Encrypt and store a JSON value.
    Set { key: String, json: String },
    /// Decrypt, verify and print a stored value.
    Get { key: String },
    /// Delete a stored value.
    Remove { key: String },
    /// Round-trip a probe value through the configured backend.
    Health,
    /// Print this machine's fingerprint.
    Fingerprint,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
