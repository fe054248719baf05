//! Backend trait definition.

use crate::error::BackendResult;
use async_trait::async_trait;

/// A durable key-value backend for keysync.
///
/// Backends are **opaque text stores**. Values are always UTF-8 JSON text
/// produced by the engine; the backend stores and returns them verbatim.
///
/// # Invariants
///
/// - `get` returns exactly the text most recently passed to `set` for that key
/// - `get` returns `None` for a key that was never set or has been removed
/// - `remove` on an absent key succeeds
/// - Concurrent writers are resolved last-write-wins
/// - Backends must be `Send + Sync` so they can be shared across attachments
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - For browser-like platforms and tests
/// - [`super::FileBackend`] - General persistent store
/// - [`super::EncryptedBackend`] - Encrypted wrapper for sensitive values
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Reads the raw value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read or the
    /// stored entry cannot be decoded.
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be completed.
    async fn set(&self, key: &str, value: &str) -> BackendResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be completed.
    async fn remove(&self, key: &str) -> BackendResult<()>;

    /// Short name used in log output.
    fn name(&self) -> &str;
}
