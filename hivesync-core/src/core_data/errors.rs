//! Error types for the data layer

use std::time::Duration;
use thiserror::Error;

use crate::core_dht::{ContentAddress, DhtError, FourPartKey};

/// Errors reported by the data manager
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
    /// The overlay rejected the put or did not acknowledge it on enough replicas
    #[error("Put failed for {key}: {reason}")]
    PutFailed { key: FourPartKey, reason: String },

    /// A put failed and taking back its partial write failed as well
    #[error("Put failed for {key}: {reason}; cleanup failed: {cleanup}")]
    CleanupFailed { key: FourPartKey, reason: String, cleanup: String },

    /// The overlay did not answer in time
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: &'static str, timeout: Duration },

    /// The based-on chain of the written version loops back on itself
    #[error("Version chain cycle at {0}")]
    ChainCycle(FourPartKey),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The keyring holds no key pair for the slot's current protector
    #[error("No protection key available for {0}")]
    ProtectionKeyUnavailable(ContentAddress),

    #[error("DHT error: {0}")]
    Dht(#[from] DhtError),
}

impl From<bincode::Error> for DataError {
    fn from(err: bincode::Error) -> Self {
        DataError::Serialization(err.to_string())
    }
}

/// Result type for data layer operations
pub type DataResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_display() {
        let err = DataError::Timeout { operation: "put", timeout: Duration::from_secs(2) };
        assert_eq!(err.to_string(), "put timed out after 2s");

        let dht: DataError = DhtError::Storage("disk".to_string()).into();
        assert_eq!(dht.to_string(), "DHT error: Storage error: disk");

        let key = ContentAddress::hashed("location", "content").key(crate::core_dht::DhtKey::hash_string("v1"));
        let err = DataError::CleanupFailed {
            key,
            reason: "acknowledged by 2 of 3 replicas, 3 required".to_string(),
            cleanup: format!("could not remove {}", key),
        };
        assert!(err.to_string().ends_with(&format!("cleanup failed: could not remove {}", key)));
    }
}
