/*
    DataConfig - config params for the data manager

    Responsibilities:
    `data_config.rs` defines how long the data manager waits for the overlay,
    how many replica acknowledgements make a put successful, and whether
    version chains are checked for cycles before a put.
*/

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for data manager behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Upper bound on every overlay call
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Replica acknowledgements a put needs to succeed
    pub required_acks: usize,

    /// Reject puts whose based-on chain loops back to the written version
    pub validate_chains: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            operation_timeout: Duration::from_secs(10),
            required_acks: 1,
            validate_chains: true,
        }
    }
}

impl DataConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set operation timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Builder: set required acknowledgements
    pub fn with_required_acks(mut self, acks: usize) -> Self {
        self.required_acks = acks;
        self
    }

    /// Builder: enable or disable chain validation
    pub fn with_chain_validation(mut self, enabled: bool) -> Self {
        self.validate_chains = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DataConfig::default();
        assert_eq!(config.operation_timeout, Duration::from_secs(10));
        assert_eq!(config.required_acks, 1);
        assert!(config.validate_chains);
    }

    #[test]
    fn test_humantime_serialization() {
        let config = DataConfig::new().with_operation_timeout(Duration::from_millis(250));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"250ms\""));

        let back: DataConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
