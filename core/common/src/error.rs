//! Common error types for Life Chest.

use thiserror::Error;

/// Top-level error type for vault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The supplied key or credential does not open the vault.
    #[error("Wrong credentials: {0}")]
    Credential(String),

    /// Stored data exists but cannot be decrypted or parsed with a key
    /// that is otherwise known to be good.
    #[error("Vault data is corrupted: {0}")]
    Corruption(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Container magic or version is not understood.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The requested unlock mechanism cannot be used on this device.
    #[error("Unlock mechanism unavailable: {0}")]
    MechanismUnavailable(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The user dismissed a credential prompt.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Whether the user can simply be prompted again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Credential(_) | Error::Cancelled(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_categories() {
        assert!(Error::Credential("bad pin".into()).is_recoverable());
        assert!(Error::Cancelled("dismissed".into()).is_recoverable());
        assert!(!Error::Corruption("manifest".into()).is_recoverable());
        assert!(!Error::UnsupportedFormat("magic".into()).is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
