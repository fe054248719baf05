//! Configuration for the synchronization engine.

use crate::error::{ErrorKind, StoreError};
use std::fmt;
use std::sync::Arc;

/// Receives every fault the engine reports.
///
/// Load and broadcast faults have no caller to return to, so the sink is the
/// only place they surface outside attachment state. Mutation faults are
/// reported here and also returned to the caller.
pub trait ErrorSink: Send + Sync {
    /// Reports a classified fault.
    fn report(&self, error: &StoreError);
}

/// Default sink that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, error: &StoreError) {
        match error.kind() {
            ErrorKind::Parse => {
                tracing::warn!(key = error.key(), kind = %error.kind(), "{}", error.message())
            }
            _ => tracing::error!(key = error.key(), kind = %error.kind(), "{}", error.message()),
        }
    }
}

impl<F> ErrorSink for F
where
    F: Fn(&StoreError) + Send + Sync,
{
    fn report(&self, error: &StoreError) {
        self(error)
    }
}

/// Configuration for a [`KeySync`](crate::KeySync) root.
#[derive(Clone)]
pub struct EngineConfig {
    /// Where faults are reported.
    pub error_sink: Arc<dyn ErrorSink>,
    /// Whether a corrupt entry found during load is erased from the backend.
    pub cleanup_corrupt: bool,
}

impl EngineConfig {
    /// Creates a configuration with the tracing sink and cleanup enabled.
    pub fn new() -> Self {
        Self {
            error_sink: Arc::new(TracingSink),
            cleanup_corrupt: true,
        }
    }

    /// Sets the error sink.
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    /// Enables or disables best-effort erasure of corrupt entries.
    pub fn with_cleanup_corrupt(mut self, enabled: bool) -> Self {
        self.cleanup_corrupt = enabled;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("cleanup_corrupt", &self.cleanup_corrupt)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn config_defaults() {
        let config = EngineConfig::default();
        assert!(config.cleanup_corrupt);
    }

    #[test]
    fn config_builder() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let config = EngineConfig::new()
            .with_cleanup_corrupt(false)
            .with_error_sink(Arc::new(move |e: &StoreError| {
                sink_seen.lock().push(e.kind());
            }));

        assert!(!config.cleanup_corrupt);
        config
            .error_sink
            .report(&StoreError::new(ErrorKind::Write, "k", "boom"));
        assert_eq!(*seen.lock(), vec![ErrorKind::Write]);
    }
}
