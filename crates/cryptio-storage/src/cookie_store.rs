use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use cryptio_core::{
    config::{CookieSettings, StorageKind},
    storage::{BackendError, StorageBackend},
};

/// Largest single cookie (`name=value`) a user agent is required to keep.
pub const MAX_COOKIE_BYTES: usize = 4096;

/// Cookie jar scoped to one domain and path.
///
/// Names and values are stored base64url-encoded so arbitrary keys and JSON
/// records stay within the cookie token grammar.
#[derive(Debug, Clone)]
pub struct CookieStorage {
    jar: Arc<Mutex<BTreeMap<String, String>>>,
    domain: Option<String>,
    path: String,
    secure: bool,
}

impl CookieStorage {
    pub fn new(settings: &CookieSettings) -> Self {
        Self {
            jar: Arc::default(),
            domain: settings.domain.clone(),
            path: settings.path.clone(),
            secure: settings.secure,
        }
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// `Cookie` request header carrying every cookie in the jar.
    pub fn cookie_header(&self) -> Result<String, BackendError> {
        Ok(self
            .lock()?
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; "))
    }

    /// `Set-Cookie` response header for one key, if present.
    pub fn set_cookie_header(&self, key: &str) -> Result<Option<String>, BackendError> {
        let name = encode(key);
        let jar = self.lock()?;
        let Some(value) = jar.get(&name) else {
            return Ok(None);
        };

        let mut header = format!("{name}={value}; Path={}", self.path);
        if let Some(domain) = &self.domain {
            header.push_str(&format!("; Domain={domain}"));
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header.push_str("; SameSite=Strict");
        Ok(Some(header))
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, BackendError> {
        self.jar.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

impl StorageBackend for CookieStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Cookie
    }

    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let Some(raw) = self.lock()?.get(&encode(key)).cloned() else {
            return Ok(None);
        };
        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|e| BackendError::Storage {
            reason: format!("cookie value decode failed: {e}"),
        })?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| BackendError::Storage {
                reason: format!("cookie value is not utf-8: {e}"),
            })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let size = self.encoded_len(key, value) as usize + 1;
        if size > MAX_COOKIE_BYTES {
            return Err(BackendError::Rejected {
                reason: format!("cookie of {size} bytes exceeds the {MAX_COOKIE_BYTES}-byte limit"),
            });
        }
        self.lock()?.insert(encode(key), encode(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.lock()?.remove(&encode(key));
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, String)>, BackendError> {
        Ok(self
            .lock()?
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }

    fn encoded_len(&self, key: &str, value: &str) -> u64 {
        (unpadded_len(key.len()) + unpadded_len(value.len())) as u64
    }
}

fn encode(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text)
}

fn unpadded_len(bytes: usize) -> usize {
    (bytes * 4 + 2) / 3
}
