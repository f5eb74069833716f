/*
    DHTStorage - local storage engine of one overlay peer

    Responsibilities:
    `dht_storage.rs` implements the ordered key-value store a peer keeps for the
    keys it is responsible for.
    It handles:
    - ordered map keyed by four-part key, so every slot is a contiguous range
    - exact and range reads (ascending/descending, limit)
    - range removal and digests (keys without payload)
    - expiration of stale values
    - the protector of every slot

    Authorization is split from mutation: the overlay checks `authorize` on every
    reachable replica before it mutates any of them.

    Inputs:
    - put(key, value, new protector), get(target), remove(target), digest(target)

    Outputs:
    - stored records
    - removed keys
    - expiration scans
*/

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use super::dht_key::{ContentAddress, DhtKey, FourPartKey};
use super::dht_value::DhtValue;
use super::errors::{DhtError, DhtResult};
use super::protection::{self, ProtectionProof, Protector};
use super::service::{Digest, DhtRecord, Order, Target};

/// Get current Unix timestamp in seconds
fn current_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Entry in the storage with metadata
#[derive(Debug, Clone)]
struct StorageEntry {
    value: DhtValue,
    /// When this entry was stored locally (Unix timestamp)
    stored_at: u64,
}

impl StorageEntry {
    fn new(value: DhtValue) -> Self {
        StorageEntry { value, stored_at: current_timestamp() }
    }
}

#[derive(Default)]
struct StorageInner {
    entries: BTreeMap<FourPartKey, StorageEntry>,
    protectors: HashMap<ContentAddress, Protector>,
}

impl StorageInner {
    /// Entries of `target` in ascending key order
    fn matching(&self, target: &Target) -> Vec<(&FourPartKey, &StorageEntry)> {
        match target {
            Target::Key(key) => self.entries.get_key_value(key).into_iter().collect(),
            Target::Range { address, range } => {
                if range.is_empty() {
                    return Vec::new();
                }
                let lower = Bound::Included(address.key(range.from));
                let upper = if range.to == DhtKey::MAX {
                    Bound::Included(address.key(DhtKey::MAX))
                } else {
                    Bound::Excluded(address.key(range.to))
                };
                self.entries.range((lower, upper)).collect()
            }
        }
    }
}

/// Simple in-memory DHT storage
#[derive(Clone, Default)]
pub struct DhtStorage {
    inner: Arc<RwLock<StorageInner>>,
}

impl DhtStorage {
    /// Create a new DHT storage
    pub fn new() -> Self {
        DhtStorage::default()
    }

    /// Check that `proof` authorizes a mutation of `address`
    pub fn authorize(
        &self,
        address: &ContentAddress,
        proof: Option<&ProtectionProof>,
        message: &[u8],
    ) -> DhtResult<()> {
        let inner = self.read()?;
        protection::authorize(inner.protectors.get(address), proof, message, address)
    }

    /// Store a value, installing `new_protector` on its slot when given
    pub fn put(
        &self,
        key: FourPartKey,
        value: DhtValue,
        new_protector: Option<Protector>,
    ) -> DhtResult<()> {
        let mut inner = self.write()?;
        inner.entries.insert(key, StorageEntry::new(value));
        if let Some(protector) = new_protector {
            inner.protectors.insert(key.address(), protector);
        }
        Ok(())
    }

    /// Non-expired records of `target`
    pub fn get(&self, target: &Target, order: Order, limit: Option<usize>) -> DhtResult<Vec<DhtRecord>> {
        let inner = self.read()?;
        let protector = inner.protectors.get(&target.address()).copied();
        let mut records: Vec<DhtRecord> = inner
            .matching(target)
            .into_iter()
            .filter(|(_, entry)| !entry.value.is_expired())
            .map(|(key, entry)| DhtRecord { key: *key, value: entry.value.clone(), protector })
            .collect();

        if order == Order::Descending {
            records.reverse();
        }
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Remove every entry of `target`, returning the live keys removed
    ///
    /// Expired entries in the target are dropped as well. Removing the last
    /// live entry of a slot releases its protector.
    pub fn remove(&self, target: &Target) -> DhtResult<Vec<FourPartKey>> {
        let mut inner = self.write()?;
        let matched: Vec<(FourPartKey, bool)> = inner
            .matching(target)
            .into_iter()
            .map(|(key, entry)| (*key, entry.value.is_expired()))
            .collect();
        for (key, _) in &matched {
            inner.entries.remove(key);
        }

        let address = target.address();
        let slot_empty = inner
            .matching(&Target::all(address))
            .into_iter()
            .all(|(_, entry)| entry.value.is_expired());
        if slot_empty {
            inner.protectors.remove(&address);
        }
        Ok(matched.into_iter().filter(|(_, expired)| !expired).map(|(key, _)| key).collect())
    }

    /// Keys of `target` with their based-on links
    pub fn digest(&self, target: &Target) -> DhtResult<Digest> {
        let inner = self.read()?;
        Ok(inner
            .matching(target)
            .into_iter()
            .filter(|(_, entry)| !entry.value.is_expired())
            .map(|(key, entry)| (*key, entry.value.based_on))
            .collect())
    }

    /// Current protector of a slot
    pub fn protector(&self, address: &ContentAddress) -> DhtResult<Option<Protector>> {
        Ok(self.read()?.protectors.get(address).copied())
    }

    /// Local store time of an entry
    pub fn stored_at(&self, key: &FourPartKey) -> DhtResult<Option<u64>> {
        Ok(self.read()?.entries.get(key).map(|entry| entry.stored_at))
    }

    /// Get all keys in storage
    pub fn keys(&self) -> DhtResult<Vec<FourPartKey>> {
        Ok(self.read()?.entries.keys().copied().collect())
    }

    /// Remove all expired entries
    pub fn cleanup_expired(&self) -> DhtResult<usize> {
        let mut inner = self.write()?;
        let before_count = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.value.is_expired());

        let live: std::collections::HashSet<ContentAddress> =
            inner.entries.keys().map(|key| key.address()).collect();
        inner.protectors.retain(|address, _| live.contains(address));

        Ok(before_count - inner.entries.len())
    }

    /// Get total number of stored entries
    pub fn size(&self) -> DhtResult<usize> {
        Ok(self.read()?.entries.len())
    }

    /// Clear all entries
    pub fn clear(&self) -> DhtResult<()> {
        let mut inner = self.write()?;
        inner.entries.clear();
        inner.protectors.clear();
        Ok(())
    }

    fn read(&self) -> DhtResult<std::sync::RwLockReadGuard<'_, StorageInner>> {
        self.inner
            .read()
            .map_err(|e| DhtError::Storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> DhtResult<std::sync::RwLockWriteGuard<'_, StorageInner>> {
        self.inner
            .write()
            .map_err(|e| DhtError::Storage(format!("Failed to acquire write lock: {}", e)))
    }
}
