//! Advisory capacity checks, so a full backend fails fast with a quota error
//! instead of an opaque storage error.

use cryptio_core::{config::StorageKind, storage::StorageBackend, CryptioError};

/// Ceiling for local and session storage (1024 * 1025 * 5 bytes).
pub const LOCAL_SESSION_MAX: u64 = 1024 * 1025 * 5;
/// Ceiling for cookie storage.
pub const COOKIE_MAX: u64 = 1024 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub local: u64,
    pub session: u64,
    pub cookie: u64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            local: LOCAL_SESSION_MAX,
            session: LOCAL_SESSION_MAX,
            cookie: COOKIE_MAX,
        }
    }
}

impl QuotaLimits {
    /// The same ceiling for every backend kind.
    pub fn uniform(max: u64) -> Self {
        Self {
            local: max,
            session: max,
            cookie: max,
        }
    }

    pub fn max_for(&self, kind: StorageKind) -> u64 {
        match kind {
            StorageKind::Local => self.local,
            StorageKind::Session => self.session,
            StorageKind::Cookie => self.cookie,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaManager {
    limits: QuotaLimits,
}

impl QuotaManager {
    pub fn new(limits: QuotaLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Bytes still available on `backend`, read from its live state.
    pub fn remaining_capacity(&self, backend: &dyn StorageBackend) -> Result<u64, CryptioError> {
        let max = self.limits.max_for(backend.kind());
        let used = backend.usage()?;
        Ok(max.saturating_sub(used))
    }

    pub fn has_capacity(
        &self,
        backend: &dyn StorageBackend,
        additional: u64,
    ) -> Result<bool, CryptioError> {
        Ok(self.remaining_capacity(backend)? >= additional)
    }

    /// Fail with [`CryptioError::QuotaExceeded`] unless `additional` bytes fit.
    pub fn ensure_capacity(
        &self,
        backend: &dyn StorageBackend,
        additional: u64,
    ) -> Result<(), CryptioError> {
        let remaining = self.remaining_capacity(backend)?;
        check(backend, remaining, additional)
    }

    /// Like [`ensure_capacity`](Self::ensure_capacity) for a write to `key`:
    /// the entry it overwrites no longer counts against the limit.
    pub fn ensure_capacity_for_replace(
        &self,
        backend: &dyn StorageBackend,
        key: &str,
        required: u64,
    ) -> Result<(), CryptioError> {
        let max = self.limits.max_for(backend.kind());
        let replaced = backend
            .get(key)?
            .map(|old| backend.encoded_len(key, &old))
            .unwrap_or(0);
        let used = backend.usage()?.saturating_sub(replaced);
        check(backend, max.saturating_sub(used), required)
    }
}

fn check(backend: &dyn StorageBackend, remaining: u64, required: u64) -> Result<(), CryptioError> {
    if remaining >= required {
        return Ok(());
    }
    Err(CryptioError::QuotaExceeded {
        kind: backend.kind(),
        required,
        remaining,
    })
}
