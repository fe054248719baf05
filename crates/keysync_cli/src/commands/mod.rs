//! CLI command implementations.

pub mod get;
pub mod rm;
pub mod set;

use hkdf::Hkdf;
use keysync_engine::{Backends, KeySync, Security};
use keysync_storage::{EncryptedBackend, EncryptionKey, FileBackend, KeyValueBackend, KEY_SIZE};
use sha2::Sha256;
use std::path::PathBuf;
use std::sync::Arc;

const KEY_SALT: &[u8] = b"keysync.cli.salt";
const KEY_INFO: &[u8] = b"keysync secure store v1";

/// Where and how a command reaches the store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Store directory. Standard keys live in `general/`, secure keys in
    /// `secure/`.
    pub dir: PathBuf,
    /// Route through the encrypted store.
    pub secure: bool,
    /// Passphrase the encryption key is derived from.
    pub passphrase: Option<String>,
}

impl StoreOptions {
    /// The security level commands should use.
    pub fn security(&self) -> Security {
        if self.secure {
            Security::Secure
        } else {
            Security::Standard
        }
    }
}

/// Derives the store encryption key from a passphrase.
pub fn derive_key(passphrase: &str) -> Result<EncryptionKey, Box<dyn std::error::Error>> {
    let hk = Hkdf::<Sha256>::new(Some(KEY_SALT), passphrase.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hk.expand(KEY_INFO, &mut okm)
        .map_err(|e| format!("key derivation failed: {e}"))?;
    Ok(EncryptionKey::from_bytes(&okm)?)
}

/// Opens the engine root described by `options`.
pub async fn open(options: &StoreOptions) -> Result<KeySync, Box<dyn std::error::Error>> {
    let general = Arc::new(FileBackend::open(&options.dir.join("general")).await?);

    let backends = match &options.passphrase {
        Some(passphrase) => {
            let files = Arc::new(FileBackend::open(&options.dir.join("secure")).await?);
            let secure: Arc<dyn KeyValueBackend> =
                Arc::new(EncryptedBackend::new(files, derive_key(passphrase)?));
            Backends::native(general, secure)
        }
        None if options.secure => {
            return Err("A passphrase is required for --secure".into());
        }
        // Only standard keys are reachable without a passphrase.
        None => Backends::browser(general),
    };

    tracing::debug!(dir = %options.dir.display(), secure = options.secure, "store opened");
    Ok(KeySync::new(backends))
}
