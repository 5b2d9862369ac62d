use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use thiserror::Error;

use crate::config::StorageKind;

/// Errors produced by raw storage backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Underlying medium failure.
    #[error("{reason}")]
    Storage { reason: String },
    /// The medium refused the value (e.g. a cookie over the size limit).
    #[error("write rejected: {reason}")]
    Rejected { reason: String },
}

/// Plain string get/set by key against one storage medium.
///
/// Backends store exactly what they are given; encryption happens above them.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> StorageKind;

    /// Fetch the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `value` under `key`, overwriting any existing entry.
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Remove a key and its value (idempotent).
    fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// All entries in the form the medium holds them.
    fn entries(&self) -> Result<Vec<(String, String)>, BackendError>;

    /// Bytes the medium would spend on storing `value` under `key`.
    fn encoded_len(&self, key: &str, value: &str) -> u64 {
        (key.len() + value.len()) as u64
    }

    /// Bytes currently spent on all entries.
    fn usage(&self) -> Result<u64, BackendError> {
        Ok(self
            .entries()?
            .iter()
            .map(|(key, value)| (key.len() + value.len()) as u64)
            .sum())
    }
}

/// Process-memory backend. Entries live as long as any clone of the handle.
#[derive(Debug, Default, Clone)]
pub struct SessionStorage {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, BackendError> {
        self.inner.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

impl StorageBackend for SessionStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Session
    }

    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, String)>, BackendError> {
        Ok(self
            .lock()?
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
