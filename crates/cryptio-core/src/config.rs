//! Caller options, their defaults, and the resolved settings a facade runs on.
//!
//! [`Options`] is the partial, user-facing shape (every leaf optional) that
//! can come from code or a TOML file. [`Options::resolve`] layers it over
//! [`Options::defaults`] and validates the enumerated leaves.

use std::{fmt, path::PathBuf, str::FromStr};

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptioError;

pub const DEFAULT_STORAGE: &str = "local";
pub const DEFAULT_KEY_LENGTH: u32 = 256;
pub const DEFAULT_HASHING: &str = "SHA-512";
pub const DEFAULT_KEYTYPE: &str = "AES-GCM";
pub const DEFAULT_OUTPUT: &str = "base64";
pub const DEFAULT_SALT: &str = "cryptio.v1";
pub const DEFAULT_COOKIE_PATH: &str = "/";

/// Secret used to derive the working keys. Never printed, wiped on drop.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Caller-supplied options. Unset leaves fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Options {
    pub passphrase: Option<Passphrase>,
    /// One of `local`, `session`, `cookie`.
    pub storage: Option<String>,
    /// Root directory of the local backend.
    pub data_dir: Option<PathBuf>,
    pub crypto: Option<CryptoOptions>,
    pub cookie: Option<CookieOptions>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CryptoOptions {
    /// Symmetric key length in bits.
    pub length: Option<u32>,
    /// Digest used for key derivation and signatures.
    pub hashing: Option<String>,
    /// Symmetric cipher.
    pub keytype: Option<String>,
    /// Text encoding of binary envelope fields.
    pub output: Option<String>,
    pub salt: Option<String>,
    /// Mix the machine fingerprint into key derivation.
    pub bind_to_machine: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: Option<bool>,
}

impl Options {
    /// The built-in defaults, expressed as fully populated options.
    pub fn defaults() -> Self {
        Self {
            passphrase: Some(Passphrase::default()),
            storage: Some(DEFAULT_STORAGE.to_string()),
            data_dir: None,
            crypto: Some(CryptoOptions {
                length: Some(DEFAULT_KEY_LENGTH),
                hashing: Some(DEFAULT_HASHING.to_string()),
                keytype: Some(DEFAULT_KEYTYPE.to_string()),
                output: Some(DEFAULT_OUTPUT.to_string()),
                salt: Some(DEFAULT_SALT.to_string()),
                bind_to_machine: Some(false),
            }),
            cookie: Some(CookieOptions {
                domain: None,
                path: Some(DEFAULT_COOKIE_PATH.to_string()),
                secure: Some(true),
            }),
        }
    }

    /// Layer `self` over `fallback`; values set on `self` win at every leaf.
    pub fn merge(self, fallback: Options) -> Options {
        Options {
            passphrase: self.passphrase.or(fallback.passphrase),
            storage: self.storage.or(fallback.storage),
            data_dir: self.data_dir.or(fallback.data_dir),
            crypto: merge_nested(self.crypto, fallback.crypto, CryptoOptions::merge),
            cookie: merge_nested(self.cookie, fallback.cookie, CookieOptions::merge),
        }
    }

    /// Merge over the defaults and validate the enumerated leaves.
    pub fn resolve(self) -> Result<Settings, CryptioError> {
        let merged = self.merge(Options::defaults());
        let crypto = merged.crypto.unwrap_or_default();
        let cookie = merged.cookie.unwrap_or_default();

        let storage: StorageKind = merged
            .storage
            .as_deref()
            .unwrap_or(DEFAULT_STORAGE)
            .parse()?;
        let output: OutputEncoding = crypto
            .output
            .as_deref()
            .unwrap_or(DEFAULT_OUTPUT)
            .parse()?;

        Ok(Settings {
            passphrase: merged.passphrase.unwrap_or_default(),
            storage,
            data_dir: merged.data_dir,
            crypto: CryptoSettings {
                length: crypto.length.unwrap_or(DEFAULT_KEY_LENGTH),
                hashing: crypto.hashing.unwrap_or_else(|| DEFAULT_HASHING.to_string()),
                keytype: crypto.keytype.unwrap_or_else(|| DEFAULT_KEYTYPE.to_string()),
                output,
                salt: crypto.salt.unwrap_or_else(|| DEFAULT_SALT.to_string()),
                bind_to_machine: crypto.bind_to_machine.unwrap_or(false),
            },
            cookie: CookieSettings {
                domain: cookie.domain,
                path: cookie
                    .path
                    .unwrap_or_else(|| DEFAULT_COOKIE_PATH.to_string()),
                secure: cookie.secure.unwrap_or(true),
            },
        })
    }
}

impl CryptoOptions {
    fn merge(self, fallback: CryptoOptions) -> CryptoOptions {
        CryptoOptions {
            length: self.length.or(fallback.length),
            hashing: self.hashing.or(fallback.hashing),
            keytype: self.keytype.or(fallback.keytype),
            output: self.output.or(fallback.output),
            salt: self.salt.or(fallback.salt),
            bind_to_machine: self.bind_to_machine.or(fallback.bind_to_machine),
        }
    }
}

impl CookieOptions {
    fn merge(self, fallback: CookieOptions) -> CookieOptions {
        CookieOptions {
            domain: self.domain.or(fallback.domain),
            path: self.path.or(fallback.path),
            secure: self.secure.or(fallback.secure),
        }
    }
}

fn merge_nested<T>(primary: Option<T>, fallback: Option<T>, merge: fn(T, T) -> T) -> Option<T> {
    match (primary, fallback) {
        (Some(primary), Some(fallback)) => Some(merge(primary, fallback)),
        (primary, fallback) => primary.or(fallback),
    }
}

/// Fully resolved configuration of one facade instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub passphrase: Passphrase,
    pub storage: StorageKind,
    pub data_dir: Option<PathBuf>,
    pub crypto: CryptoSettings,
    pub cookie: CookieSettings,
}

/// Algorithm names stay textual here; the crypto provider decides which
/// combinations it supports when keys are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoSettings {
    pub length: u32,
    pub hashing: String,
    pub keytype: String,
    pub output: OutputEncoding,
    pub salt: String,
    pub bind_to_machine: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
}

/// Backend a facade writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Local,
    Session,
    Cookie,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::Session => "session",
            StorageKind::Cookie => "cookie",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = CryptioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            "session" => Ok(StorageKind::Session),
            "cookie" | "cookies" => Ok(StorageKind::Cookie),
            other => Err(CryptioError::Configuration {
                reason: format!("unsupported storage backend `{other}`"),
            }),
        }
    }
}

/// Text encoding of the binary envelope fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    /// Standard alphabet, padded.
    #[default]
    Base64,
    /// URL-safe alphabet, unpadded.
    Base64Url,
}

impl OutputEncoding {
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            OutputEncoding::Base64 => STANDARD.encode(bytes),
            OutputEncoding::Base64Url => URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    pub fn decode(&self, text: &str) -> Result<Vec<u8>, base64::DecodeError> {
        match self {
            OutputEncoding::Base64 => STANDARD.decode(text),
            OutputEncoding::Base64Url => URL_SAFE_NO_PAD.decode(text),
        }
    }
}

impl FromStr for OutputEncoding {
    type Err = CryptioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "base64" => Ok(OutputEncoding::Base64),
            "base64url" | "base64-url" => Ok(OutputEncoding::Base64Url),
            other => Err(CryptioError::Configuration {
                reason: format!("unsupported output encoding `{other}`"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_options_resolve_to_defaults() {
        let settings = Options::default().resolve().expect("resolve");
        assert_eq!(settings.storage, StorageKind::Local);
        assert!(settings.passphrase.is_empty());
        assert_eq!(settings.crypto.length, 256);
        assert_eq!(settings.crypto.hashing, "SHA-512");
        assert_eq!(settings.crypto.keytype, "AES-GCM");
        assert_eq!(settings.crypto.output, OutputEncoding::Base64);
        assert_eq!(settings.cookie.path, "/");
        assert!(settings.cookie.secure);
    }

    #[test]
    fn caller_wins_at_every_leaf() {
        let options = Options {
            passphrase: Some("p@ss".into()),
            storage: Some("session".into()),
            crypto: Some(CryptoOptions {
                hashing: Some("SHA-256".into()),
                ..CryptoOptions::default()
            }),
            ..Options::default()
        };

        let settings = options.resolve().expect("resolve");
        assert_eq!(settings.passphrase.expose(), "p@ss");
        assert_eq!(settings.storage, StorageKind::Session);
        assert_eq!(settings.crypto.hashing, "SHA-256");
        // Sibling leaves keep their defaults.
        assert_eq!(settings.crypto.length, 256);
        assert_eq!(settings.crypto.keytype, "AES-GCM");
    }

    #[test]
    fn merge_prefers_primary_layer() {
        let file = Options {
            storage: Some("cookie".into()),
            cookie: Some(CookieOptions {
                domain: Some("example.com".into()),
                ..CookieOptions::default()
            }),
            ..Options::default()
        };
        let flags = Options {
            storage: Some("local".into()),
            ..Options::default()
        };

        let merged = flags.merge(file);
        assert_eq!(merged.storage.as_deref(), Some("local"));
        assert_eq!(
            merged.cookie.and_then(|c| c.domain).as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn unsupported_storage_is_a_configuration_error() {
        let options = Options {
            storage: Some("indexeddb".into()),
            ..Options::default()
        };
        let err = options.resolve().expect_err("should reject backend");
        assert!(matches!(err, CryptioError::Configuration { .. }));
    }

    #[test]
    fn unsupported_output_is_a_configuration_error() {
        let options = Options {
            crypto: Some(CryptoOptions {
                output: Some("hex".into()),
                ..CryptoOptions::default()
            }),
            ..Options::default()
        };
        assert!(matches!(
            options.resolve(),
            Err(CryptioError::Configuration { .. })
        ));
    }

    #[test]
    fn parses_options_from_toml() {
        let options: Options = toml::from_str(
            r#"
                passphrase = "secret"
                storage = "cookie"
                [crypto]
                length = 128
                output = "base64url"
                [cookie]
                domain = "example.com"
            "#,
        )
        .expect("parse");

        let settings = options.resolve().expect("resolve");
        assert_eq!(settings.storage, StorageKind::Cookie);
        assert_eq!(settings.crypto.length, 128);
        assert_eq!(settings.crypto.output, OutputEncoding::Base64Url);
        assert_eq!(settings.cookie.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn passphrase_is_redacted_in_debug_output() {
        let options = Options {
            passphrase: Some("hunter2".into()),
            ..Options::default()
        };
        let rendered = format!("{options:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn output_encodings_round_trip() {
        for encoding in [OutputEncoding::Base64, OutputEncoding::Base64Url] {
            let text = encoding.encode(&[0xFB, 0xFF, 0x00, 0x10]);
            assert_eq!(encoding.decode(&text).unwrap(), vec![0xFB, 0xFF, 0x00, 0x10]);
        }
        assert_eq!(OutputEncoding::Base64Url.encode(&[0xFB, 0xFF]), "-_8");
    }
}
