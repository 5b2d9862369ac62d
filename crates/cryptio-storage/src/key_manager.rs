use std::{env, fmt, sync::Arc};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use cryptio_core::{
    codec,
    config::{CryptoSettings, Settings},
    CryptioError,
};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::provider::{CryptoProvider, Hashing, KeySpec, KeyType, ProviderError, SecretKey};

const INFO_PREFIX: &str = "cryptio/v1";
const KEY_ID_LABEL: &[u8] = b"cryptio/v1/key-id";

/// How a [`KeyMaterial`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Derived from the passphrase; reproducible across sessions.
    Derived,
    /// Random; records written with it die with the session.
    Ephemeral,
}

/// Session key handle: independent encryption and signing sub-keys.
#[derive(Debug)]
pub struct KeyMaterial {
    /// Identifier for logging (never log key bytes).
    id: String,
    origin: KeyOrigin,
    hashing: Hashing,
    encryption: SecretKey,
    signing: SecretKey,
}

impl KeyMaterial {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn origin(&self) -> KeyOrigin {
        self.origin
    }

    /// Digest used for signatures and hashing.
    pub fn hashing(&self) -> Hashing {
        self.hashing
    }

    pub fn cipher(&self) -> KeySpec {
        self.encryption.spec()
    }

    pub(crate) fn encryption_key(&self) -> &SecretKey {
        &self.encryption
    }

    pub(crate) fn signing_key(&self) -> &SecretKey {
        &self.signing
    }
}

/// Descriptors of the running environment, hashed into a machine fingerprint.
pub trait FingerprintSource: Send + Sync + fmt::Debug {
    fn descriptors(&self) -> Vec<String>;
}

/// OS, architecture, OS family, language and host name of this process.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentFingerprint;

impl FingerprintSource for EnvironmentFingerprint {
    fn descriptors(&self) -> Vec<String> {
        vec![
            env::consts::OS.to_string(),
            env::consts::ARCH.to_string(),
            env::consts::FAMILY.to_string(),
            env::var("LANG").unwrap_or_default(),
            env::var("HOSTNAME")
                .or_else(|_| env::var("COMPUTERNAME"))
                .unwrap_or_default(),
        ]
    }
}

/// Fixed descriptors, for tests and embedders that know their identity.
#[derive(Debug, Default, Clone)]
pub struct StaticFingerprint(pub Vec<String>);

impl FingerprintSource for StaticFingerprint {
    fn descriptors(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Validated algorithm choices for one key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyParams {
    cipher: KeySpec,
    hashing: Hashing,
}

impl KeyParams {
    fn from_settings(settings: &CryptoSettings) -> Result<Self, CryptioError> {
        let keytype: KeyType = settings.keytype.parse().map_err(key_generation)?;
        let hashing: Hashing = settings.hashing.parse().map_err(key_generation)?;
        Ok(Self {
            cipher: KeySpec::Cipher {
                keytype,
                length_bits: settings.length,
            },
            hashing,
        })
    }

    fn label(&self) -> String {
        match self.cipher {
            KeySpec::Cipher {
                keytype,
                length_bits,
            } => format!("{}-{length_bits}/{}", keytype.name(), self.hashing.name()),
            KeySpec::Mac { hashing } => hashing.name().to_string(),
        }
    }
}

fn key_generation(err: ProviderError) -> CryptioError {
    CryptioError::KeyGeneration {
        reason: err.to_string(),
    }
}

/// Turns a passphrase plus configuration into [`KeyMaterial`].
#[derive(Debug, Clone)]
pub struct KeyManager {
    provider: Arc<dyn CryptoProvider>,
    fingerprint: Arc<dyn FingerprintSource>,
}

impl KeyManager {
    pub fn new(provider: Arc<dyn CryptoProvider>, fingerprint: Arc<dyn FingerprintSource>) -> Self {
        Self {
            provider,
            fingerprint,
        }
    }

    /// Digest of the concatenated environment descriptors.
    pub async fn machine_fingerprint(&self, hashing: Hashing) -> Result<Vec<u8>, CryptioError> {
        let joined = self.fingerprint.descriptors().concat();
        let bytes = codec::encode(&joined)?;
        self.provider
            .digest(hashing, &bytes)
            .await
            .map_err(|e| CryptioError::Hash {
                reason: e.to_string(),
            })
    }

    /// Derive both sub-keys from the passphrase, or generate ephemeral ones
    /// when no passphrase is configured.
    #[instrument(skip_all, fields(keytype = %settings.crypto.keytype, length = settings.crypto.length))]
    pub async fn derive_or_generate(&self, settings: &Settings) -> Result<KeyMaterial, CryptioError> {
        let params = KeyParams::from_settings(&settings.crypto)?;
        let fingerprint = self.machine_fingerprint(params.hashing).await?;
        let mac_spec = KeySpec::Mac {
            hashing: params.hashing,
        };

        let (origin, encryption, signing) = if settings.passphrase.is_empty() {
            warn!("no passphrase configured; generating ephemeral session keys");
            let encryption = self
                .provider
                .generate_key(params.cipher)
                .await
                .map_err(key_generation)?;
            let signing = self
                .provider
                .generate_key(mac_spec)
                .await
                .map_err(key_generation)?;
            (KeyOrigin::Ephemeral, encryption, signing)
        } else {
            let ikm = Zeroizing::new(codec::encode(settings.passphrase.expose())?);
            let salt = codec::encode(&settings.crypto.salt)?;
            let binding = settings.crypto.bind_to_machine.then_some(fingerprint.as_slice());
            let label = params.label();

            let encryption = self
                .provider
                .derive_key(
                    params.cipher,
                    params.hashing,
                    &ikm,
                    &salt,
                    &info("encrypt", &label, binding),
                )
                .await
                .map_err(key_generation)?;
            let signing = self
                .provider
                .derive_key(
                    mac_spec,
                    params.hashing,
                    &ikm,
                    &salt,
                    &info("sign", &label, binding),
                )
                .await
                .map_err(key_generation)?;
            (KeyOrigin::Derived, encryption, signing)
        };

        let tag = self
            .provider
            .sign(&signing, KEY_ID_LABEL)
            .await
            .map_err(key_generation)?;
        let id = key_id(origin, &tag);
        debug!(key_id = %id, provider = self.provider.name(), "key material ready");

        Ok(KeyMaterial {
            id,
            origin,
            hashing: params.hashing,
            encryption,
            signing,
        })
    }
}

fn info(purpose: &str, label: &str, binding: Option<&[u8]>) -> Vec<u8> {
    let mut info = format!("{INFO_PREFIX}/{purpose}/{label}").into_bytes();
    if let Some(fingerprint) = binding {
        info.push(b'/');
        info.extend_from_slice(fingerprint);
    }
    info
}

/// `derived-`/`ephemeral-` plus a short tag computed under the signing key,
/// so the id names the keys without revealing them.
fn key_id(origin: KeyOrigin, tag: &[u8]) -> String {
    let prefix = match origin {
        KeyOrigin::Derived => "derived",
        KeyOrigin::Ephemeral => "ephemeral",
    };
    let tag = &tag[..tag.len().min(6)];
    format!("{prefix}-{}", URL_SAFE_NO_PAD.encode(tag))
}
