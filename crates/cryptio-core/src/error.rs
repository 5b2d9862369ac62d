use thiserror::Error;

use crate::{
    codec::{DecodeError, EncodeError},
    config::StorageKind,
    storage::BackendError,
};

/// Every failure surfaced by `initialize`, `set`, `get` and `remove`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptioError {
    /// Bad or unsupported option.
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },
    /// The crypto provider rejected the key parameters.
    #[error("key generation failed: {reason}")]
    KeyGeneration { reason: String },
    #[error("utf-8 encode: {0}")]
    Encoding(#[from] EncodeError),
    #[error("utf-8 decode: {0}")]
    Decoding(#[from] DecodeError),
    #[error("hashing failed: {reason}")]
    Hash { reason: String },
    #[error("signing failed: {reason}")]
    Sign { reason: String },
    #[error("signature verification failed to run: {reason}")]
    Verify { reason: String },
    #[error("encryption failed: {reason}")]
    Encrypt { reason: String },
    #[error("decryption failed: {reason}")]
    Decrypt { reason: String },
    /// The stored record did not authenticate. Plaintext is withheld.
    #[error("stored data for key `{key}` has been tampered with")]
    TamperDetected { key: String },
    /// Pre-write capacity check failed; nothing was written.
    #[error("{kind} storage quota exceeded: {required} bytes required, {remaining} available")]
    QuotaExceeded {
        kind: StorageKind,
        required: u64,
        remaining: u64,
    },
    #[error("entry not found for key: {key}")]
    NotFound { key: String },
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },
    /// Underlying backend failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

impl From<BackendError> for CryptioError {
    fn from(err: BackendError) -> Self {
        CryptioError::Storage {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CryptioError {
    fn from(err: serde_json::Error) -> Self {
        CryptioError::Serialization {
            reason: err.to_string(),
        }
    }
}

impl CryptioError {
    /// True for integrity failures, where plaintext must not be trusted.
    pub fn is_tamper(&self) -> bool {
        matches!(self, CryptioError::TamperDetected { .. })
    }
}
