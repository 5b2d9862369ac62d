//! Raw key/value persistence contracts.

mod backend;

pub use backend::{BackendError, SessionStorage, StorageBackend};
