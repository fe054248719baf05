//! Encrypted backend wrapper.
//!
//! This module provides an encrypted backend that wraps any other backend
//! with AES-256-GCM encryption at rest.
//!
//! ## Security Model
//!
//! - Each value is encrypted independently with a fresh random nonce
//! - Stored form: `base64(nonce (12 bytes) || ciphertext || tag (16 bytes))`
//! - The key name is bound to the ciphertext as associated data, so an entry
//!   copied under another key fails authentication
//! - Keys are never stored; they must be provided by the application

use crate::backend::KeyValueBackend;
use crate::error::{BackendError, BackendResult};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encryption key for the encrypted backend.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> BackendResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(BackendError::Encryption(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Returns the key as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// An encrypted backend that wraps another backend.
///
/// Values written through this backend are encrypted with AES-256-GCM
/// before they reach the inner store and decrypted on the way out. This is
/// the secure store selected for sensitive attachments on native platforms.
///
/// # Example
///
/// ```rust
/// use keysync_storage::{EncryptedBackend, EncryptionKey, MemoryBackend};
/// use std::sync::Arc;
///
/// let key = EncryptionKey::from_bytes(&[7u8; 32]).unwrap();
/// let secure = EncryptedBackend::new(Arc::new(MemoryBackend::new()), key);
/// ```
pub struct EncryptedBackend {
    inner: Arc<dyn KeyValueBackend>,
    cipher: Aes256Gcm,
}

impl EncryptedBackend {
    /// Creates a new encrypted backend wrapping the given inner backend.
    pub fn new(inner: Arc<dyn KeyValueBackend>, key: EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        Self { inner, cipher }
    }

    /// Encrypts `plaintext` for storage under `key`.
    fn seal(&self, key: &str, plaintext: &str) -> BackendResult<String> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| BackendError::Encryption("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Decrypts a value produced by [`seal`](Self::seal).
    fn open(&self, key: &str, stored: &str) -> BackendResult<String> {
        let sealed = BASE64
            .decode(stored.trim())
            .map_err(|e| BackendError::Encryption(format!("invalid envelope: {e}")))?;

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(BackendError::Encryption("ciphertext too short".to_string()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| {
                tracing::warn!(key, "stored value failed authentication");
                BackendError::Encryption("authentication failed".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| BackendError::Corrupted(format!("decrypted value is not UTF-8: {e}")))
    }
}

impl std::fmt::Debug for EncryptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBackend")
            .field("inner", &self.inner.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueBackend for EncryptedBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        match self.inner.get(key).await? {
            Some(stored) => self.open(key, &stored).map(Some),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let sealed = self.seal(key, value)?;
        self.inner.set(key, &sealed).await
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        self.inner.remove(key).await
    }

    fn name(&self) -> &str {
        "encrypted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    fn backend_with_key(byte: u8) -> (Arc<MemoryBackend>, EncryptedBackend) {
        let inner = Arc::new(MemoryBackend::new());
        let key = EncryptionKey::from_bytes(&[byte; KEY_SIZE]).unwrap();
        let backend = EncryptedBackend::new(inner.clone(), key);
        (inner, backend)
    }

    #[tokio::test]
    async fn encrypted_set_then_get() {
        let (_, backend) = backend_with_key(0x42);

        backend.set("token", r#""s3cret""#).await.unwrap();
        assert_eq!(
            backend.get("token").await.unwrap().as_deref(),
            Some(r#""s3cret""#)
        );
    }

    #[tokio::test]
    async fn inner_store_never_sees_plaintext() {
        let (inner, backend) = backend_with_key(0x42);

        backend.set("token", r#""s3cret""#).await.unwrap();
        let stored = inner.snapshot().remove("token").unwrap();
        assert!(!stored.contains("s3cret"));
    }

    #[tokio::test]
    async fn tampered_data_fails() {
        let (inner, backend) = backend_with_key(0x42);
        backend.set("token", r#""s3cret""#).await.unwrap();

        let stored = inner.get("token").await.unwrap().unwrap();
        let mut raw = BASE64.decode(stored).unwrap();
        raw[NONCE_SIZE + 1] ^= 0xFF;
        inner.set("token", &BASE64.encode(raw)).await.unwrap();

        let result = backend.get("token").await;
        assert!(matches!(result, Err(BackendError::Encryption(_))));
    }

    #[tokio::test]
    async fn different_keys_fail() {
        let (inner, writer) = backend_with_key(0x42);
        writer.set("token", "1").await.unwrap();

        let other_key = EncryptionKey::from_bytes(&[0x43u8; KEY_SIZE]).unwrap();
        let reader = EncryptedBackend::new(inner, other_key);
        assert!(reader.get("token").await.is_err());
    }

    #[tokio::test]
    async fn entry_moved_to_other_key_fails() {
        let (inner, backend) = backend_with_key(0x42);
        backend.set("a", "1").await.unwrap();

        let stored = inner.get("a").await.unwrap().unwrap();
        inner.set("b", &stored).await.unwrap();
        assert!(backend.get("b").await.is_err());
    }

    #[tokio::test]
    async fn remove_and_missing() {
        let (_, backend) = backend_with_key(0x01);
        assert_eq!(backend.get("absent").await.unwrap(), None);

        backend.set("k", "1").await.unwrap();
        backend.remove("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[test]
    fn invalid_key_size_rejected() {
        assert!(EncryptionKey::from_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = EncryptionKey::generate();
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
