//! Backend selection and fault classification.
//!
//! The engine never talks to a [`KeyValueBackend`] directly. Each attachment
//! resolves one [`BackendAdapter`] from the configured [`Backends`] and its
//! [`Security`] level; the adapter turns every raw [`BackendError`] into a
//! [`StoreError`] of kind `read`, `write` or `delete`.
//!
//! [`BackendError`]: keysync_storage::BackendError

use crate::error::{ErrorKind, StoreError, StoreResult};
use keysync_storage::KeyValueBackend;
use std::fmt;
use std::sync::Arc;

/// How sensitive a key's value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Security {
    /// General persistent storage.
    #[default]
    Standard,
    /// Encrypted storage.
    Secure,
}

/// The backends available to a [`KeySync`](crate::KeySync) root.
#[derive(Clone)]
pub enum Backends {
    /// Native platforms keep sensitive values in a separate, encrypted store.
    Native {
        /// Store used for [`Security::Standard`].
        general: Arc<dyn KeyValueBackend>,
        /// Store used for [`Security::Secure`].
        secure: Arc<dyn KeyValueBackend>,
    },
    /// Browser-like platforms have one simple store for everything.
    Browser {
        /// Store used regardless of security level.
        store: Arc<dyn KeyValueBackend>,
    },
}

impl Backends {
    /// Native platform backends.
    pub fn native(general: Arc<dyn KeyValueBackend>, secure: Arc<dyn KeyValueBackend>) -> Self {
        Backends::Native { general, secure }
    }

    /// Browser-like platform backend.
    pub fn browser(store: Arc<dyn KeyValueBackend>) -> Self {
        Backends::Browser { store }
    }

    /// Resolves the backend for a security level.
    pub fn select(&self, security: Security) -> Arc<dyn KeyValueBackend> {
        match (self, security) {
            (Backends::Native { general, .. }, Security::Standard) => Arc::clone(general),
            (Backends::Native { secure, .. }, Security::Secure) => Arc::clone(secure),
            (Backends::Browser { store }, _) => Arc::clone(store),
        }
    }

    /// Resolves an adapter for a security level.
    pub fn adapter(&self, security: Security) -> BackendAdapter {
        BackendAdapter::new(self.select(security))
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backends::Native { general, secure } => f
                .debug_struct("Native")
                .field("general", &general.name())
                .field("secure", &secure.name())
                .finish(),
            Backends::Browser { store } => f
                .debug_struct("Browser")
                .field("store", &store.name())
                .finish(),
        }
    }
}

/// Uniform capability set over one backend.
///
/// No retries are performed; faults are classified and returned at once.
#[derive(Clone)]
pub struct BackendAdapter {
    backend: Arc<dyn KeyValueBackend>,
}

impl BackendAdapter {
    /// Wraps a backend.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    /// Name of the wrapped backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Reads the raw value for `key`.
    pub async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        self.backend
            .get(key)
            .await
            .map_err(|e| StoreError::backend(ErrorKind::Read, key, e))
    }

    /// Writes the raw value for `key`.
    pub async fn write(&self, key: &str, raw: &str) -> StoreResult<()> {
        self.backend
            .set(key, raw)
            .await
            .map_err(|e| StoreError::backend(ErrorKind::Write, key, e))
    }

    /// Removes `key`.
    pub async fn erase(&self, key: &str) -> StoreResult<()> {
        self.backend
            .remove(key)
            .await
            .map_err(|e| StoreError::backend(ErrorKind::Delete, key, e))
    }
}

impl fmt::Debug for BackendAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendAdapter")
            .field("backend", &self.backend.name())
            .finish()
    }
}
