//! In-process networks for data and process tests
//!
//! [`TestNetwork`] wires a [`LocalDht`], a [`DataManager`] and a key manager
//! together. [`FaultyDht`] wraps any overlay and rejects chosen operations so
//! tests can drive failures and failed compensations. It also records the
//! removes it let through, so tests can observe compensation order.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::core_data::{DataConfig, DataManager, ProtectionKeyManager, ProtectionKeys, VersionedEntry};
use crate::core_dht::{
    ContentAddress, Digest, DhtConfig, DhtError, DhtRecord, DhtResult, DhtService, FourPartKey,
    GetRequest, LocalDht, PutAck, PutRequest, RemoveRequest, Target,
};
use crate::core_process::ExecutionEnv;
use crate::logging::LogHandle;

/// Overlay, data manager and key manager of one test
pub struct TestNetwork {
    dht: Arc<LocalDht>,
    data: DataManager,
    keys: Arc<ProtectionKeyManager>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self::with_config(DhtConfig::default(), DataConfig::default())
    }

    pub fn with_config(dht_config: DhtConfig, data_config: DataConfig) -> Self {
        let dht = Arc::new(LocalDht::new(dht_config, LogHandle::disabled()));
        let data = DataManager::new(dht.clone(), data_config, LogHandle::disabled());
        TestNetwork { dht, data, keys: Arc::new(ProtectionKeyManager::new()) }
    }

    /// Network whose data manager talks to the overlay through `wrap`
    pub fn wrapped<F>(wrap: F) -> Self
    where
        F: FnOnce(Arc<LocalDht>) -> Arc<dyn DhtService>,
    {
        Self::wrapped_with_config(DhtConfig::default(), DataConfig::default(), wrap)
    }

    pub fn wrapped_with_config<F>(dht_config: DhtConfig, data_config: DataConfig, wrap: F) -> Self
    where
        F: FnOnce(Arc<LocalDht>) -> Arc<dyn DhtService>,
    {
        let dht = Arc::new(LocalDht::new(dht_config, LogHandle::disabled()));
        let data = DataManager::new(wrap(dht.clone()), data_config, LogHandle::disabled());
        TestNetwork { dht, data, keys: Arc::new(ProtectionKeyManager::new()) }
    }

    /// Fresh execution environment with an empty context
    pub fn env(&self) -> ExecutionEnv {
        ExecutionEnv::new(self.data.clone(), self.keys.clone(), LogHandle::new("test"))
    }

    pub fn data(&self) -> &DataManager {
        &self.data
    }

    pub fn keys(&self) -> &Arc<ProtectionKeyManager> {
        &self.keys
    }

    pub fn dht(&self) -> &LocalDht {
        &self.dht
    }

    /// Number of keys present for `target`, read straight from the overlay
    pub async fn digest_len(&self, target: Target) -> usize {
        self.dht.digest(target).await.map(|d| d.len()).unwrap_or(0)
    }

    /// Write one unprotected entry based on the slot's current head
    pub async fn seed_entry(&self, address: ContentAddress, content: &[u8]) -> FourPartKey {
        self.seed_protected(address, content, &ProtectionKeys::unprotected()).await
    }

    /// Write one entry with the given key transition
    pub async fn seed_protected(
        &self,
        address: ContentAddress,
        content: &[u8],
        keys: &ProtectionKeys,
    ) -> FourPartKey {
        let mut entry = match self.data.get_latest(address).await {
            Ok(Some(head)) => head.entry.successor(content.to_vec()),
            _ => VersionedEntry::new(content.to_vec()),
        };
        match self.data.put(address, &mut entry, keys).await {
            Ok(key) => {
                self.keys.record_put(address, keys);
                key
            }
            Err(e) => panic!("seeding {} failed: {}", address, e),
        }
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay wrapper that rejects puts to chosen slots and, when armed, removes
///
/// Every remove the inner overlay applied is recorded in call order.
pub struct FaultyDht {
    inner: Arc<dyn DhtService>,
    failing_puts: Mutex<HashSet<ContentAddress>>,
    fail_removes: AtomicBool,
    lose_remove_replies: AtomicBool,
    removes: Mutex<Vec<Target>>,
}

impl FaultyDht {
    pub fn new(inner: Arc<dyn DhtService>) -> Self {
        FaultyDht {
            inner,
            failing_puts: Mutex::new(HashSet::new()),
            fail_removes: AtomicBool::new(false),
            lose_remove_replies: AtomicBool::new(false),
            removes: Mutex::new(Vec::new()),
        }
    }

    /// Apply removes but report them as failed while set
    pub fn lose_remove_replies(&self, lose: bool) {
        self.lose_remove_replies.store(lose, Ordering::SeqCst);
    }

    /// Targets of the removes applied so far
    pub fn removes(&self) -> Vec<Target> {
        self.removes.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Reject every put to `address`
    pub fn fail_puts_to(&self, address: ContentAddress) {
        if let Ok(mut failing) = self.failing_puts.lock() {
            failing.insert(address);
        }
    }

    /// Reject every remove while set
    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DhtService for FaultyDht {
    async fn put(&self, request: PutRequest) -> DhtResult<PutAck> {
        let address = request.key.address();
        let rejected = self.failing_puts.lock().map(|f| f.contains(&address)).unwrap_or(false);
        if rejected {
            return Err(DhtError::Storage(format!("injected put failure on {}", address)));
        }
        self.inner.put(request).await
    }

    async fn get(&self, request: GetRequest) -> DhtResult<Vec<DhtRecord>> {
        self.inner.get(request).await
    }

    async fn remove(&self, request: RemoveRequest) -> DhtResult<usize> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(DhtError::Storage("injected remove failure".to_string()));
        }
        let target = request.target;
        let removed = self.inner.remove(request).await?;
        if let Ok(mut removes) = self.removes.lock() {
            removes.push(target);
        }
        if self.lose_remove_replies.load(Ordering::SeqCst) {
            return Err(DhtError::Storage("remove reply lost".to_string()));
        }
        Ok(removed)
    }

    async fn digest(&self, target: Target) -> DhtResult<Digest> {
        self.inner.digest(target).await
    }
}
