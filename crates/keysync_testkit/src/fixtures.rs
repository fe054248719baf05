//! Test fixtures and engine helpers.
//!
//! Provides ready-made engine roots and value types for common test
//! scenarios.

use crate::faults::FlakyBackend;
use crate::sink::CollectingSink;
use keysync_engine::{Backends, EngineConfig, KeySync};
use keysync_storage::{EncryptedBackend, EncryptionKey, FileBackend, KeyValueBackend};
use serde::ser::{Error as _, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use tempfile::TempDir;

/// A small JSON-serializable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    /// The count.
    pub n: u32,
}

impl Counter {
    /// Creates a counter.
    pub fn new(n: u32) -> Self {
        Self { n }
    }

    /// The JSON text the engine stores for this counter.
    pub fn raw(&self) -> String {
        format!(r#"{{"n":{}}}"#, self.n)
    }
}

/// A value whose serialization can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Fragile {
    /// Payload.
    pub n: u32,
    /// When set, serialization fails.
    #[serde(skip)]
    pub poisoned: bool,
}

impl Fragile {
    /// A value that serializes normally.
    pub fn ok(n: u32) -> Self {
        Self { n, poisoned: false }
    }

    /// A value that refuses to serialize.
    pub fn poisoned(n: u32) -> Self {
        Self { n, poisoned: true }
    }
}

impl Serialize for Fragile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.poisoned {
            return Err(S::Error::custom("refusing to serialize poisoned value"));
        }
        let mut state = serializer.serialize_struct("Fragile", 1)?;
        state.serialize_field("n", &self.n)?;
        state.end()
    }
}

/// An engine root over a [`FlakyBackend`] with a [`CollectingSink`].
///
/// Uses browser-style backends, so every security level shares the one
/// flaky store.
pub struct TestRoot {
    /// The engine root.
    pub root: KeySync,
    /// The backend every attachment talks to.
    pub backend: Arc<FlakyBackend>,
    /// Every fault the engine reported.
    pub sink: Arc<CollectingSink>,
}

impl TestRoot {
    /// A root over an empty backend.
    pub fn new() -> Self {
        Self::with_backend(FlakyBackend::new())
    }

    /// A root over the given backend.
    pub fn with_backend(backend: FlakyBackend) -> Self {
        Self::with_config(backend, EngineConfig::default())
    }

    /// A root over the given backend and configuration.
    ///
    /// The configuration's error sink is replaced by the collecting sink.
    pub fn with_config(backend: FlakyBackend, config: EngineConfig) -> Self {
        let backend = Arc::new(backend);
        let sink = Arc::new(CollectingSink::new());
        let root = KeySync::with_config(
            Backends::browser(backend.clone()),
            config.with_error_sink(sink.clone()),
        );
        Self {
            root,
            backend,
            sink,
        }
    }
}

impl Default for TestRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestRoot {
    type Target = KeySync;

    fn deref(&self) -> &Self::Target {
        &self.root
    }
}

/// A native-platform root over file backends in a temporary directory.
pub struct DiskRoot {
    /// The engine root.
    pub root: KeySync,
    /// Plain file store used for standard keys.
    pub general: Arc<FileBackend>,
    /// File store underneath the encrypted backend.
    pub secure_files: Arc<FileBackend>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl DiskRoot {
    /// Creates file-backed stores with a random encryption key.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let general = Arc::new(
            FileBackend::open(&temp_dir.path().join("general"))
                .await
                .expect("Failed to open general store"),
        );
        let secure_files = Arc::new(
            FileBackend::open(&temp_dir.path().join("secure"))
                .await
                .expect("Failed to open secure store"),
        );
        let secure: Arc<dyn KeyValueBackend> = Arc::new(EncryptedBackend::new(
            secure_files.clone(),
            EncryptionKey::generate(),
        ));

        Self {
            root: KeySync::new(Backends::native(general.clone(), secure)),
            general,
            secure_files,
            _temp_dir: temp_dir,
        }
    }
}

impl std::ops::Deref for DiskRoot {
    type Target = KeySync;

    fn deref(&self) -> &Self::Target {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_raw_matches_serde() {
        let counter = Counter::new(4);
        assert_eq!(counter.raw(), serde_json::to_string(&counter).unwrap());
    }

    #[test]
    fn fragile_serialization() {
        assert_eq!(serde_json::to_string(&Fragile::ok(1)).unwrap(), r#"{"n":1}"#);
        assert!(serde_json::to_string(&Fragile::poisoned(1)).is_err());

        let parsed: Fragile = serde_json::from_str(r#"{"n":2}"#).unwrap();
        assert_eq!(parsed, Fragile::ok(2));
    }
}
