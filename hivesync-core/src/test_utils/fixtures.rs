//! Test fixtures for creating common test objects

use rand::distr::Alphanumeric;
use rand::Rng;

use super::deterministic_rng::{deterministic_bytes_with_seed, deterministic_seed};
use crate::core_data::{MetaFolder, ProtectionKeyPair, VersionedEntry};
use crate::core_dht::{ContentAddress, DhtKey};

/// Random alphanumeric string, for names that must not collide across tests
pub fn random_string(len: usize) -> String {
    rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

/// Slot under a fixed test location
pub fn test_address(content: &str) -> ContentAddress {
    ContentAddress::hashed("test-location", content)
}

/// Slot with a random content name
pub fn unique_address() -> ContentAddress {
    test_address(&random_string(16))
}

/// Key pair derived from `seed`; equal seeds give equal keys
pub fn test_key_pair(seed: u64) -> ProtectionKeyPair {
    ProtectionKeyPair::from_seed(deterministic_seed(seed))
}

pub fn test_version(label: &str) -> DhtKey {
    DhtKey::hash_string(label)
}

/// Chain of entries `contents[0] <- contents[1] <- ...`, version keys assigned
pub fn test_chain(contents: &[&[u8]]) -> Vec<VersionedEntry> {
    let mut chain: Vec<VersionedEntry> = Vec::with_capacity(contents.len());
    for content in contents {
        let mut entry = match chain.last() {
            Some(previous) => previous.successor(content.to_vec()),
            None => VersionedEntry::new(content.to_vec()),
        };
        entry.ensure_version_key();
        chain.push(entry);
    }
    chain
}

/// Slot plus a set of deterministic payloads to write into it
#[derive(Debug, Clone)]
pub struct TestData {
    pub address: ContentAddress,
    pub payloads: Vec<Vec<u8>>,
}

impl TestData {
    /// `count` payloads of `size` bytes under a fresh slot
    pub fn new(count: usize, size: usize) -> Self {
        let payloads = (0..count)
            .map(|i| deterministic_bytes_with_seed(size, i as u64))
            .collect();
        TestData { address: unique_address(), payloads }
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// The payloads as a linked version chain
    pub fn chain(&self) -> Vec<VersionedEntry> {
        let contents: Vec<&[u8]> = self.payloads.iter().map(Vec::as_slice).collect();
        test_chain(&contents)
    }
}

pub fn test_meta_folder(name: &str, owner: &str) -> MetaFolder {
    MetaFolder::new(name, owner)
}
