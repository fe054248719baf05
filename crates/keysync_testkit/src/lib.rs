//! # keysync testkit
//!
//! Test utilities for keysync.
//!
//! This crate provides:
//! - A fault-injecting backend with an operation log and a write gate
//! - An error sink that records every reported fault
//! - Engine fixtures over in-memory and temporary on-disk stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use keysync_engine::Security;
//! use keysync_testkit::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let t = TestRoot::new();
//! t.backend.fail_next(OpKind::Set, 1);
//!
//! let view = t.attach::<Counter>("counter", Security::Standard);
//! view.ready().await;
//! assert!(view.set(Counter::new(1)).await.is_err());
//! assert_eq!(t.sink.len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod sink;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::sink::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use sink::*;
