//! # keysync storage
//!
//! Durable key-value backends for keysync.
//!
//! Backends are **opaque text stores**: they map a string key to a UTF-8
//! string value and do not interpret the value. JSON encoding, optimistic
//! state and change notification all live in `keysync_engine`.
//!
//! ## Design Principles
//!
//! - Backends are simple async text stores (get, set, remove)
//! - Every call may suspend and every call may fail
//! - Must be `Send + Sync` so they can be shared between attachments
//! - No retries; faults are returned immediately
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - Simple synchronous store wrapped in the async API
//! - [`FileBackend`] - General persistent store, one file per key
//! - [`EncryptedBackend`] - Wrapper that adds AES-256-GCM encryption
//!
//! ## Example
//!
//! ```rust
//! use keysync_storage::{KeyValueBackend, MemoryBackend};
//!
//! # tokio_test_block(async {
//! let backend = MemoryBackend::new();
//! backend.set("theme", r#""dark""#).await.unwrap();
//! assert_eq!(backend.get("theme").await.unwrap().as_deref(), Some(r#""dark""#));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod encrypted;
mod error;
mod file;
mod memory;

pub use backend::KeyValueBackend;
pub use encrypted::{EncryptedBackend, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{BackendError, BackendResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
