//! Error types for backend operations.

use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by a durable key-value backend.
///
/// These are raw faults. The engine never exposes them directly; it wraps
/// them as the `cause` of a classified store error.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored entry could not be decoded as text.
    #[error("stored entry corrupted: {0}")]
    Corrupted(String),

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The backend refused or could not service the request.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert() {
        let err: BackendError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, BackendError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn error_display() {
        let err = BackendError::Unavailable("quota exceeded".into());
        assert_eq!(err.to_string(), "backend unavailable: quota exceeded");
    }
}
