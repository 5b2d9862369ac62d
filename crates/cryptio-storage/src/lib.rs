//! Encrypted, tamper-evident key/value storage.
//!
//! [`SecureStorage`] signs and encrypts every value with keys derived from a
//! passphrase, then persists the resulting envelope through one of the
//! backends in this crate (or the in-memory session backend from
//! `cryptio-core`).

pub mod cookie_store;
pub mod engine;
pub mod envelope;
pub mod facade;
pub mod key_manager;
pub mod local_store;
pub mod provider;
pub mod quota;

pub use cookie_store::CookieStorage;
pub use engine::CryptoEngine;
pub use facade::{SecureStorage, SecureStorageBuilder};
pub use key_manager::{EnvironmentFingerprint, KeyManager, KeyMaterial, StaticFingerprint};
pub use local_store::LocalStorage;
pub use provider::{CryptoProvider, RustCryptoProvider};
pub use quota::{QuotaLimits, QuotaManager};
