//! Error types for the synchronization engine.

use keysync_storage::BackendError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared, type-erased underlying fault.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The operation that produced a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Reading from the backend failed.
    Read,
    /// Writing to the backend failed.
    Write,
    /// Removing from the backend failed.
    Delete,
    /// A stored or broadcast value is not valid JSON for the target type.
    Parse,
    /// A value could not be serialized to JSON.
    Stringify,
    /// Any other fault, wrapped.
    Other,
}

impl ErrorKind {
    /// Returns the lowercase operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Read => "read",
            ErrorKind::Write => "write",
            ErrorKind::Delete => "delete",
            ErrorKind::Parse => "parse",
            ErrorKind::Stringify => "stringify",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified storage fault.
///
/// Every fault the engine surfaces, whether it ends up in attachment state,
/// in the error sink, or returned to a caller, is one of these. The
/// original fault is kept as [`source`](std::error::Error::source).
///
/// Cloning is cheap; the cause is shared.
#[derive(Debug, Clone, Error)]
#[error("{kind} failed for key `{key}`: {message}")]
pub struct StoreError {
    kind: ErrorKind,
    key: String,
    message: String,
    #[source]
    cause: Option<Cause>,
}

impl StoreError {
    /// Creates an error with no underlying cause.
    pub fn new(kind: ErrorKind, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Creates an error wrapping `cause`, using its display text as message.
    pub fn with_cause<E>(kind: ErrorKind, key: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            key: key.into(),
            message: cause.to_string(),
            cause: Some(Arc::new(cause)),
        }
    }

    /// Classifies a raw backend fault.
    pub fn backend(kind: ErrorKind, key: impl Into<String>, cause: BackendError) -> Self {
        Self::with_cause(kind, key, cause)
    }

    /// A stored or broadcast value failed to parse.
    pub fn parse(key: impl Into<String>, cause: serde_json::Error) -> Self {
        Self::with_cause(ErrorKind::Parse, key, cause)
    }

    /// A value failed to serialize.
    pub fn stringify(key: impl Into<String>, cause: serde_json::Error) -> Self {
        Self::with_cause(ErrorKind::Stringify, key, cause)
    }

    /// The operation kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The key the operation targeted.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying fault, if any.
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// Returns true if the fault originated in the backend.
    pub fn is_backend(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Read | ErrorKind::Write | ErrorKind::Delete
        )
    }
}
