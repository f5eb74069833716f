/*
    DHTValue - defines the DHT-stored value format

    Responsibilities:
    DHT values carry the opaque payload of one revision together with the metadata
    the overlay needs: the version key it supersedes (based-on link), creation
    timestamp and an optional expiration. Values without a TTL live until they
    are removed.
    `dht_value.rs` defines the structure, validation (expiration, size) and the
    hash used when a request is signed.

    Inputs:
    - serialized revision payloads
    - based-on links from the writer

    Outputs:
    - stored value records
    - value validation results
*/

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::dht_key::DhtKey;
use super::errors::{DhtError, DhtResult};

fn current_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// DHT value with metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DhtValue {
    /// The actual data payload
    pub data: Vec<u8>,

    /// Version key this revision supersedes, `None` for a root revision
    pub based_on: Option<DhtKey>,

    /// Timestamp when value was created (Unix timestamp in seconds)
    pub timestamp: u64,

    /// TTL in seconds, `None` for a value that never expires
    pub ttl: Option<u64>,
}

impl DhtValue {
    /// Create a new DHT value
    pub fn new(data: Vec<u8>) -> Self {
        DhtValue {
            data,
            based_on: None,
            timestamp: current_timestamp(),
            ttl: None,
        }
    }

    /// Set the version this value is based on
    pub fn with_based_on(mut self, based_on: Option<DhtKey>) -> Self {
        self.based_on = based_on;
        self
    }

    /// Set TTL (time-to-live) in seconds
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set TTL using Duration
    pub fn with_ttl_duration(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration.as_secs());
        self
    }

    /// Check if the value has expired
    pub fn is_expired(&self) -> bool {
        self.expiration_time().is_some_and(|at| current_timestamp() >= at)
    }

    /// Expiration timestamp, if the value expires at all
    pub fn expiration_time(&self) -> Option<u64> {
        self.ttl.map(|ttl| self.timestamp.saturating_add(ttl))
    }

    /// Cap the TTL at `max` seconds, giving a value without one that TTL
    pub fn cap_ttl(&mut self, max: u64) {
        self.ttl = Some(self.ttl.map_or(max, |ttl| ttl.min(max)));
    }

    /// Validate the value before it is stored
    pub fn validate(&self, max_size: usize) -> DhtResult<()> {
        if self.data.len() > max_size {
            return Err(DhtError::ValueTooLarge { size: self.data.len(), max: max_size });
        }
        Ok(())
    }

    /// Blake3 digest of the payload
    pub fn content_hash(&self) -> [u8; 32] {
        *blake3::hash(&self.data).as_bytes()
    }
}
