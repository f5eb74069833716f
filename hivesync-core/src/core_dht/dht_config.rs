/*
    DhtConfig - config params for the overlay

    Responsibilities:
    `dht_config.rs` defines the configuration of the in-process overlay:
    number of peers, replication factor (k closest peers per location key),
    optional value expiration, maximum value size and simulated network
    latency.

    Inputs:
    - configuration file section or defaults
    - builder calls in tests

    Outputs:
    - static values to the rest of the DHT subsystem
*/

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for DHT behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhtConfig {
    /// Number of peers in the overlay
    pub peer_count: usize,

    /// Replication factor - number of peers storing each location key
    pub replication_factor: usize,

    /// Cap on how long a value lives; `None` keeps values until removed
    #[serde(default, with = "humantime_serde")]
    pub value_ttl: Option<Duration>,

    /// Maximum value size in bytes
    pub max_value_size: usize,

    /// Delay applied to every operation, simulating the network round trip
    #[serde(with = "humantime_serde")]
    pub simulated_latency: Duration,
}

impl Default for DhtConfig {
    fn default() -> Self {
        DhtConfig {
            peer_count: 5,
            replication_factor: 3,
            value_ttl: None,
            max_value_size: 1024 * 1024, // 1 MB
            simulated_latency: Duration::ZERO,
        }
    }
}

impl DhtConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set number of peers
    pub fn with_peer_count(mut self, count: usize) -> Self {
        self.peer_count = count;
        self
    }

    /// Builder: set replication factor
    pub fn with_replication_factor(mut self, factor: usize) -> Self {
        self.replication_factor = factor;
        self
    }

    /// Builder: expire values after `ttl`
    pub fn with_value_ttl(mut self, ttl: Duration) -> Self {
        self.value_ttl = Some(ttl);
        self
    }

    /// Builder: set maximum value size
    pub fn with_max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = size;
        self
    }

    /// Builder: set simulated latency
    pub fn with_simulated_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = latency;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.peer_count == 0 {
            return Err("peer_count must be > 0".to_string());
        }
        if self.replication_factor == 0 {
            return Err("replication_factor must be > 0".to_string());
        }
        if self.replication_factor > self.peer_count {
            return Err("replication_factor must be <= peer_count".to_string());
        }
        if self.max_value_size == 0 {
            return Err("max_value_size must be > 0".to_string());
        }
        Ok(())
    }
}
