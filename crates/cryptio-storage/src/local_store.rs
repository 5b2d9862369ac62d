use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use cryptio_core::{
    config::StorageKind,
    storage::{BackendError, StorageBackend},
};
use tempfile::NamedTempFile;
use tracing::debug;

/// Durable backend: one file per key under `root`, named by the base64url
/// form of the key. Writes replace files atomically.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<data_dir>/cryptio` for the current user.
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|base| base.join("cryptio"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BackendError> {
        if key.is_empty() {
            return Err(BackendError::Rejected {
                reason: "key must not be empty".to_string(),
            });
        }
        Ok(self.root.join(sanitize_key(key)))
    }
}

impl StorageBackend for LocalStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let path = self.path_for(key)?;
        read_entry(&path)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let path = self.path_for(key)?;
        write_entry(&path, value)
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        let path = self.path_for(key)?;
        match fs::remove_file(path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }

    fn entries(&self) -> Result<Vec<(String, String)>, BackendError> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(storage_err(err)),
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(storage_err)?;
            if !entry.file_type().map_err(storage_err)?.is_file() {
                continue;
            }
            // Temp files from in-flight writes do not decode and are skipped.
            let Some(key) = entry.file_name().to_str().and_then(restore_key) else {
                continue;
            };
            if let Some(value) = read_entry(&entry.path())? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }
}

fn write_entry(path: &Path, value: &str) -> Result<(), BackendError> {
    let parent = path.parent().ok_or_else(|| BackendError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(value.as_bytes()).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    debug!(?path, bytes = value.len(), "local entry written");
    Ok(())
}

fn read_entry(path: &Path) -> Result<Option<String>, BackendError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(storage_err(err)),
    };

    let mut buf = String::new();
    file.read_to_string(&mut buf).map_err(storage_err)?;
    Ok(Some(buf))
}

fn sanitize_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn restore_key(file_name: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(file_name).ok()?;
    String::from_utf8(bytes).ok()
}

fn storage_err<E: ToString>(err: E) -> BackendError {
    BackendError::Storage {
        reason: err.to_string(),
    }
}
