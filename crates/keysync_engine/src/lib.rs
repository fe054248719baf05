//! # keysync engine
//!
//! Keeps one logical value per string key synchronized across every consumer
//! in a process, on top of a slow, fallible, asynchronous backend.
//!
//! This crate provides:
//! - Attachments: per-consumer state machines (loading → ready | faulted)
//! - Optimistic mutation with in-order backend application per attachment
//! - Rollback on failure, skipped when a later mutation superseded it
//! - Typed fault classification (`read`, `write`, `delete`, `parse`, `stringify`)
//! - An in-process change broker that fans committed writes out to every
//!   attachment on the same key
//!
//! ## Architecture
//!
//! ```text
//!  consumer ──mutate──▶ Attachment ──queue──▶ BackendAdapter ──▶ KeyValueBackend
//!     ▲                     │  ▲                    │
//!     └──── watch ◀─────────┘  └──── ChangeBroker ◀─┘ publish on success
//! ```
//!
//! ## Key Invariants
//!
//! - An attachment subscribes to the broker before its initial read
//! - `is_loading` is true only until the first load settles
//! - Mutations on one attachment reach the backend in call order
//! - A failed mutation rolls back only if no later mutation was issued
//! - Mutations on different attachments are not ordered against each other;
//!   they converge through broadcasts after each commit
//! - Backend faults never escape unclassified

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod attachment;
mod broker;
mod config;
mod engine;
mod error;
mod state;

pub use adapter::{BackendAdapter, Backends, Security};
pub use attachment::{Attachment, PendingMutation};
pub use broker::{ChangeBroker, Listener, ListenerId};
pub use config::{EngineConfig, ErrorSink, TracingSink};
pub use engine::KeySync;
pub use error::{Cause, ErrorKind, StoreError, StoreResult};
pub use state::{AttachmentState, Phase};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
