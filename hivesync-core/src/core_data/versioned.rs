/*
    VersionedEntry - one revision of a stored object

    Responsibilities:
    `versioned.rs` defines the unit of content the data manager writes: the
    opaque payload plus its version key and the version key it supersedes.

    - version keys are generated by the writer right before the put: 8 bytes
      of a process-wide strictly increasing nanosecond stamp followed by 24
      bytes of the payload hash, so a later write always sorts later
    - the based-on link chains revisions of one slot; a root has none
    - entries travel through the overlay bincode-encoded
*/

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::errors::DataResult;
use crate::core_dht::{DhtKey, DhtValue};

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Strictly increasing within this process, close to wall-clock nanoseconds
fn next_stamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let previous = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or_else(|last| last);
    now.max(previous.saturating_add(1))
}

/// Content plus version metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedEntry {
    /// Serialized payload
    pub content: Vec<u8>,
    /// Key naming this revision, assigned before the first put
    pub version_key: Option<DhtKey>,
    /// Revision this one supersedes
    pub based_on_key: Option<DhtKey>,
}

impl VersionedEntry {
    /// Root revision holding `content`
    pub fn new(content: Vec<u8>) -> Self {
        VersionedEntry { content, version_key: None, based_on_key: None }
    }

    /// Root revision holding a serialized value
    pub fn from_value<T: Serialize>(value: &T) -> DataResult<Self> {
        Ok(Self::new(bincode::serialize(value)?))
    }

    /// Deserialize the payload
    pub fn content_as<T: DeserializeOwned>(&self) -> DataResult<T> {
        Ok(bincode::deserialize(&self.content)?)
    }

    pub fn with_version_key(mut self, key: DhtKey) -> Self {
        self.version_key = Some(key);
        self
    }

    pub fn with_based_on(mut self, key: Option<DhtKey>) -> Self {
        self.based_on_key = key;
        self
    }

    /// Fresh version key for the current payload
    pub fn generate_version_key(&self) -> DhtKey {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&next_stamp().to_be_bytes());
        bytes[8..].copy_from_slice(&blake3::hash(&self.content).as_bytes()[..24]);
        DhtKey::from_bytes(bytes)
    }

    /// The version key, generating one if none is set yet
    pub fn ensure_version_key(&mut self) -> DhtKey {
        match self.version_key {
            Some(key) => key,
            None => {
                let key = self.generate_version_key();
                self.version_key = Some(key);
                key
            }
        }
    }

    /// Next revision based on this one
    pub fn successor(&self, content: Vec<u8>) -> VersionedEntry {
        VersionedEntry { content, version_key: None, based_on_key: self.version_key }
    }

    pub fn encode(&self) -> DataResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> DataResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Overlay value carrying this entry and its based-on link
    pub fn to_value(&self) -> DataResult<DhtValue> {
        Ok(DhtValue::new(self.encode()?).with_based_on(self.based_on_key))
    }
}
