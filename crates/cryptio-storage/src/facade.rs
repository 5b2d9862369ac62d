use std::sync::Arc;

use cryptio_core::{
    codec,
    config::{OutputEncoding, Options, Settings, StorageKind},
    storage::{SessionStorage, StorageBackend},
    value::StoredValue,
    CryptioError,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::{
    cookie_store::CookieStorage,
    engine::CryptoEngine,
    envelope::{Envelope, RecordError, StoredRecord},
    key_manager::{EnvironmentFingerprint, FingerprintSource, KeyManager, KeyMaterial},
    local_store::LocalStorage,
    provider::{CryptoProvider, RustCryptoProvider},
    quota::{QuotaLimits, QuotaManager},
};

/// Encrypted, tamper-evident key/value storage over a raw backend.
///
/// Writes sign the serialized value, encrypt it under a fresh IV and persist
/// `{iv, signature, ciphertext}`. Reads decrypt, then verify the signature,
/// and only hand the value back when it matches.
#[derive(Debug)]
pub struct SecureStorage {
    keys: Arc<KeyMaterial>,
    engine: CryptoEngine,
    quota: QuotaManager,
    backend: Arc<dyn StorageBackend>,
    output: OutputEncoding,
}

/// Configures a [`SecureStorage`]; anything not injected uses the defaults.
#[derive(Debug)]
pub struct SecureStorageBuilder {
    options: Options,
    provider: Option<Arc<dyn CryptoProvider>>,
    fingerprint: Option<Arc<dyn FingerprintSource>>,
    backend: Option<Arc<dyn StorageBackend>>,
    limits: QuotaLimits,
}

impl SecureStorageBuilder {
    pub fn provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn fingerprint(mut self, fingerprint: Arc<dyn FingerprintSource>) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Use an existing backend instead of building one from the options.
    /// Its kind must match the configured `storage`.
    pub fn backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn quota_limits(mut self, limits: QuotaLimits) -> Self {
        self.limits = limits;
        self
    }

    pub async fn build(self) -> Result<SecureStorage, CryptioError> {
        let settings = self.options.resolve()?;
        let backend = match self.backend {
            Some(backend) if backend.kind() != settings.storage => {
                return Err(CryptioError::Configuration {
                    reason: format!(
                        "configured for {} storage but given a {} backend",
                        settings.storage,
                        backend.kind()
                    ),
                });
            }
            Some(backend) => backend,
            None => backend_for(&settings)?,
        };

        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(RustCryptoProvider));
        let fingerprint = self
            .fingerprint
            .unwrap_or_else(|| Arc::new(EnvironmentFingerprint));

        let keys = KeyManager::new(Arc::clone(&provider), fingerprint)
            .derive_or_generate(&settings)
            .await?;
        let engine = CryptoEngine::new(provider, keys.hashing());

        debug!(
            storage = %settings.storage,
            key_id = keys.id(),
            "secure storage initialized"
        );

        Ok(SecureStorage {
            keys: Arc::new(keys),
            engine,
            quota: QuotaManager::new(self.limits),
            backend,
            output: settings.crypto.output,
        })
    }
}

fn backend_for(settings: &Settings) -> Result<Arc<dyn StorageBackend>, CryptioError> {
    let backend: Arc<dyn StorageBackend> = match settings.storage {
        StorageKind::Local => {
            let root = settings
                .data_dir
                .clone()
                .or_else(LocalStorage::default_root)
                .ok_or_else(|| CryptioError::Configuration {
                    reason: "no data directory available for local storage".to_string(),
                })?;
            Arc::new(LocalStorage::new(root))
        }
        StorageKind::Session => Arc::new(SessionStorage::new()),
        StorageKind::Cookie => Arc::new(CookieStorage::new(&settings.cookie)),
    };
    Ok(backend)
}

impl SecureStorage {
    pub fn builder(options: Options) -> SecureStorageBuilder {
        SecureStorageBuilder {
            options,
            provider: None,
            fingerprint: None,
            backend: None,
            limits: QuotaLimits::default(),
        }
    }

    /// Merge `options` over the defaults, derive the session keys and open
    /// the configured backend.
    pub async fn initialize(options: Options) -> Result<Self, CryptioError> {
        Self::builder(options).build().await
    }

    pub fn kind(&self) -> StorageKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Non-secret identifier of the session keys.
    pub fn key_id(&self) -> &str {
        self.keys.id()
    }

    pub fn remaining_capacity(&self) -> Result<u64, CryptioError> {
        self.quota.remaining_capacity(self.backend.as_ref())
    }

    /// Serialize, sign, encrypt and persist `value` under `key`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CryptioError> {
        let value = StoredValue::from_serializable(value)?;
        self.set_value(key, &value).await
    }

    #[instrument(skip_all, fields(key = %key, storage = %self.backend.kind()))]
    pub async fn set_value(&self, key: &str, value: &StoredValue) -> Result<(), CryptioError> {
        let text = Zeroizing::new(value.to_json_text()?);
        let signature = self.engine.sign(&self.keys, &text).await?;
        let plaintext = Zeroizing::new(codec::encode(&text)?);
        let sealed = self.engine.encrypt(&self.keys, &plaintext).await?;

        let envelope = Envelope {
            iv: sealed.iv.to_vec(),
            signature,
            ciphertext: sealed.ciphertext,
        };
        let record = envelope.to_text(self.output)?;

        let required = self.backend.encoded_len(key, &record);
        self.quota
            .ensure_capacity_for_replace(self.backend.as_ref(), key, required)?;
        self.backend.set(key, &record)?;

        debug!(shape = value.kind(), bytes = required, "record stored");
        Ok(())
    }

    /// Fetch, decrypt and verify the value under `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, CryptioError> {
        self.get_value(key).await?.into_typed()
    }

    #[instrument(skip_all, fields(key = %key, storage = %self.backend.kind()))]
    pub async fn get_value(&self, key: &str) -> Result<StoredValue, CryptioError> {
        let text = self
            .backend
            .get(key)?
            .ok_or_else(|| CryptioError::NotFound {
                key: key.to_string(),
            })?;

        let record = StoredRecord::parse(&text).map_err(|e| tampered(key, e))?;
        let iv = record.iv_bytes(self.output).map_err(|e| tampered(key, e))?;
        let ciphertext = record
            .ciphertext_bytes(self.output)
            .map_err(|e| tampered(key, e))?;

        let plaintext = Zeroizing::new(self.engine.decrypt(&self.keys, &iv, &ciphertext).await?);
        let plaintext = Zeroizing::new(codec::decode(&plaintext)?);

        // An undecodable signature can never match.
        let valid = match record.signature_bytes(self.output) {
            Ok(signature) => {
                self.engine
                    .verify(&self.keys, &signature, &plaintext)
                    .await?
            }
            Err(_) => false,
        };
        if !valid {
            warn!("signature mismatch; withholding plaintext");
            return Err(CryptioError::TamperDetected {
                key: key.to_string(),
            });
        }

        StoredValue::from_json_text(&plaintext)
    }

    /// Delete the record under `key` (idempotent).
    #[instrument(skip_all, fields(key = %key, storage = %self.backend.kind()))]
    pub fn remove(&self, key: &str) -> Result<(), CryptioError> {
        self.backend.remove(key)?;
        Ok(())
    }
}

fn tampered(key: &str, err: RecordError) -> CryptioError {
    warn!(?err, "stored record is not a valid envelope");
    CryptioError::TamperDetected {
        key: key.to_string(),
    }
}
