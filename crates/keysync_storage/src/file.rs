//! File-based backend for persistent storage.

use crate::backend::KeyValueBackend;
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// File extension for stored entries.
const ENTRY_EXTENSION: &str = "json";

/// A file-based key-value backend.
///
/// This is the general persistent store. Each key is kept in its own file
/// inside a root directory. File names are the hex encoding of the key, so
/// any string is a valid key and no key can escape the directory.
///
/// # Durability
///
/// - `set` writes to a temporary sibling file, syncs it, then renames it over
///   the entry, so readers never observe a partially written value
/// - `remove` deletes the entry file; removing an absent key is not an error
///
/// # Example
///
/// ```no_run
/// use keysync_storage::{FileBackend, KeyValueBackend};
/// use std::path::Path;
///
/// # async fn demo() -> keysync_storage::BackendResult<()> {
/// let backend = FileBackend::open(Path::new("state")).await?;
/// backend.set("session", r#"{"user":"ada"}"#).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileBackend {
    /// Opens a file backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(root: &Path) -> BackendResult<Self> {
        fs::create_dir_all(root).await?;
        Ok(Self {
            root: root.to_path_buf(),
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path of the file holding `key`.
    #[must_use]
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{ENTRY_EXTENSION}", encode_key(key)))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{}.{n}.tmp", encode_key(key)))
    }
}

/// Hex-encodes a key into a file-system-safe name.
fn encode_key(key: &str) -> String {
    key.bytes().map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
impl KeyValueBackend for FileBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let bytes = match fs::read(self.entry_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| BackendError::Corrupted(format!("entry for `{key}` is not UTF-8: {e}")))
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let tmp = self.temp_path(key);
        {
            let mut file = fs::File::create(&tmp).await?;
            tokio::io::AsyncWriteExt::write_all(&mut file, value.as_bytes()).await?;
            file.sync_all().await?;
        }

        if let Err(e) = fs::rename(&tmp, self.entry_path(key)).await {
            tracing::warn!(key, error = %e, "rename of staged entry failed");
            // Leave no stray temp file behind on failure
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                tracing::debug!(path = %tmp.display(), error = %cleanup, "temp file left behind");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_set_then_get() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend.set("pref", r#"{"a":1}"#).await.unwrap();
        assert_eq!(
            backend.get("pref").await.unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
    }

    #[tokio::test]
    async fn file_get_missing_is_none() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        assert_eq!(backend.get("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_persists_across_reopen() {
        let dir = tempdir().unwrap();

        {
            let backend = FileBackend::open(dir.path()).await.unwrap();
            backend.set("k", r#""persistent""#).await.unwrap();
        }

        let backend = FileBackend::open(dir.path()).await.unwrap();
        assert_eq!(
            backend.get("k").await.unwrap().as_deref(),
            Some(r#""persistent""#)
        );
    }

    #[tokio::test]
    async fn file_remove() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend.set("k", r#""v""#).await.unwrap();
        backend.remove("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(!backend.entry_path("k").exists());

        // Removing again is fine
        backend.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn file_keys_cannot_escape_root() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        let path = backend.entry_path("../../etc/passwd");
        assert_eq!(path.parent(), Some(dir.path()));

        backend.set("../../etc/passwd", "1").await.unwrap();
        assert_eq!(
            backend.get("../../etc/passwd").await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn file_failed_rename_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        // A non-empty directory where the entry should go makes the rename fail
        let blocker = backend.entry_path("k");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), "x").unwrap();

        assert!(matches!(backend.set("k", "1").await, Err(BackendError::Io(_))));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![blocker.file_name().unwrap().to_owned()]);
    }

    #[tokio::test]
    async fn file_non_utf8_entry_is_corrupted() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        std::fs::write(backend.entry_path("bin"), [0xff, 0xfe, 0x00]).unwrap();
        let result = backend.get("bin").await;
        assert!(matches!(result, Err(BackendError::Corrupted(_))));
    }

    #[tokio::test]
    async fn file_set_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();

        backend.set("a", "1").await.unwrap();
        backend.set("a", "2").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}.json", encode_key("a"))]);
    }
}
