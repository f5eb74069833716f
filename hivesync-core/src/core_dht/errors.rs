//! Error types for the DHT overlay

use thiserror::Error;

use super::dht_key::ContentAddress;

/// Errors reported by a DHT operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DhtError {
    /// The slot is protected and the request did not prove ownership
    #[error("Protection mismatch on {0}")]
    ProtectionMismatch(ContentAddress),

    /// A proof was attached but could not be parsed or verified
    #[error("Invalid protection proof: {0}")]
    InvalidProof(String),

    /// None of the peers responsible for the location answered
    #[error("No responsible peer reachable for {0}")]
    Unreachable(ContentAddress),

    /// Payload exceeds the configured maximum
    #[error("Value size {size} exceeds maximum {max}")]
    ValueTooLarge { size: usize, max: usize },

    /// Local storage failure on a peer
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for DHT operations
pub type DhtResult<T> = Result<T, DhtError>;
