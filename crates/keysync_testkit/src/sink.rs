//! Error sink that records what it receives.

use keysync_engine::{ErrorKind, ErrorSink, StoreError};
use parking_lot::Mutex;

/// Collects every reported fault for later assertions.
#[derive(Debug, Default)]
pub struct CollectingSink {
    errors: Mutex<Vec<StoreError>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All reported errors, oldest first.
    pub fn errors(&self) -> Vec<StoreError> {
        self.errors.lock().clone()
    }

    /// Kinds of all reported errors, oldest first.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.errors.lock().iter().map(StoreError::kind).collect()
    }

    /// Number of reported errors.
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// True if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Forgets everything reported so far.
    pub fn clear(&self) {
        self.errors.lock().clear();
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, error: &StoreError) {
        self.errors.lock().push(error.clone());
    }
}
