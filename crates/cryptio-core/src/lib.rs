//! Core contracts for cryptio: the UTF-8 codec, configuration, the error
//! taxonomy, stored value shapes and the raw storage backend interface.
//! Cryptography lives in `cryptio-storage`; this crate has no crypto deps.

pub mod codec;
pub mod config;
pub mod error;
pub mod storage;
pub mod value;

pub use error::CryptioError;
