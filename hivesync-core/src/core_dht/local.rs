/*
    LocalDht - in-process replicated overlay

    Responsibilities:
    `local.rs` implements `DhtService` over a set of in-process peers, each
    owning a `DhtStorage`. It is the overlay the data layer runs against in
    tests, benches and the harness.

    - every location key is served by the `replication_factor` peers closest
      (XOR distance) to it
    - peers can be taken offline to simulate unreachable replicas
    - mutations are authorized on every reachable replica before any replica
      is changed, so a protection mismatch never leaves a partial write
    - reads merge all reachable replicas
    - every call waits `simulated_latency` before touching storage
*/

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::dht_config::DhtConfig;
use super::dht_key::{ContentAddress, DhtKey};
use super::dht_storage::DhtStorage;
use super::errors::{DhtError, DhtResult};
use super::service::{
    Digest, DhtRecord, DhtService, GetRequest, Order, PutAck, PutRequest, RemoveRequest, Target,
};
use crate::logging::LogHandle;

/// One peer of the local overlay
#[derive(Clone)]
pub struct LocalPeer {
    id: DhtKey,
    storage: DhtStorage,
    online: Arc<AtomicBool>,
}

impl LocalPeer {
    fn new(id: DhtKey) -> Self {
        LocalPeer { id, storage: DhtStorage::new(), online: Arc::new(AtomicBool::new(true)) }
    }

    pub fn id(&self) -> DhtKey {
        self.id
    }

    pub fn storage(&self) -> &DhtStorage {
        &self.storage
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// In-process overlay of `peer_count` peers
#[derive(Clone)]
pub struct LocalDht {
    config: DhtConfig,
    peers: Vec<LocalPeer>,
    log: LogHandle,
}

impl LocalDht {
    pub fn new(config: DhtConfig, log: LogHandle) -> Self {
        let peers = (0..config.peer_count)
            .map(|i| LocalPeer::new(DhtKey::hash_string(&format!("peer-{}", i))))
            .collect();
        LocalDht { config, peers, log }
    }

    pub fn config(&self) -> &DhtConfig {
        &self.config
    }

    pub fn peers(&self) -> &[LocalPeer] {
        &self.peers
    }

    /// Take a peer offline or bring it back
    pub fn set_online(&self, peer: DhtKey, online: bool) {
        if let Some(p) = self.peers.iter().find(|p| p.id == peer) {
            p.online.store(online, Ordering::SeqCst);
            debug!(parent: self.log.span(), peer = %peer, online, "Peer availability changed");
        }
    }

    /// The `replication_factor` peers closest to `location`, online or not
    pub fn responsible(&self, location: &DhtKey) -> Vec<&LocalPeer> {
        let mut peers: Vec<&LocalPeer> = self.peers.iter().collect();
        peers.sort_by_key(|p| p.id.distance(location));
        peers.truncate(self.config.replication_factor);
        peers
    }

    fn reachable(&self, address: &ContentAddress) -> DhtResult<Vec<&LocalPeer>> {
        let peers: Vec<&LocalPeer> = self
            .responsible(&address.location)
            .into_iter()
            .filter(|p| p.is_online())
            .collect();
        if peers.is_empty() {
            warn!(parent: self.log.span(), address = %address, "No responsible peer reachable");
            return Err(DhtError::Unreachable(*address));
        }
        Ok(peers)
    }

    async fn simulate_latency(&self) {
        if !self.config.simulated_latency.is_zero() {
            tokio::time::sleep(self.config.simulated_latency).await;
        }
    }
}

#[async_trait]
impl DhtService for LocalDht {
    async fn put(&self, request: PutRequest) -> DhtResult<PutAck> {
        self.simulate_latency().await;
        request.value.validate(self.config.max_value_size)?;

        let address = request.key.address();
        let replicas = self.config.replication_factor;
        let peers = self.reachable(&address)?;
        let message = request.signing_bytes();
        for peer in &peers {
            peer.storage.authorize(&address, request.proof.as_ref(), &message)?;
        }

        let mut value = request.value;
        if let Some(max) = self.config.value_ttl {
            value.cap_ttl(max.as_secs());
        }

        let mut acks = 0;
        for peer in &peers {
            match peer.storage.put(request.key, value.clone(), request.new_protector) {
                Ok(()) => acks += 1,
                Err(e) => warn!(parent: self.log.span(), peer = %peer.id, error = %e, "Replica put failed"),
            }
        }
        trace!(parent: self.log.span(), key = %request.key, acks, replicas, "Put applied");
        Ok(PutAck { acks, replicas })
    }

    async fn get(&self, request: GetRequest) -> DhtResult<Vec<DhtRecord>> {
        self.simulate_latency().await;
        let address = request.target.address();
        let peers = match self.reachable(&address) {
            Ok(peers) => peers,
            Err(DhtError::Unreachable(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut merged = BTreeMap::new();
        for peer in peers {
            for record in peer.storage.get(&request.target, Order::Ascending, None)? {
                merged.entry(record.key).or_insert(record);
            }
        }

        let mut records: Vec<DhtRecord> = merged.into_values().collect();
        if request.order == Order::Descending {
            records.reverse();
        }
        if let Some(limit) = request.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn remove(&self, request: RemoveRequest) -> DhtResult<usize> {
        self.simulate_latency().await;
        let address = request.target.address();
        let peers = self.reachable(&address)?;
        let message = request.signing_bytes();
        for peer in &peers {
            peer.storage.authorize(&address, request.proof.as_ref(), &message)?;
        }

        let mut removed = BTreeSet::new();
        for peer in &peers {
            removed.extend(peer.storage.remove(&request.target)?);
        }
        trace!(parent: self.log.span(), address = %address, removed = removed.len(), "Remove applied");
        Ok(removed.len())
    }

    async fn digest(&self, target: Target) -> DhtResult<Digest> {
        self.simulate_latency().await;
        let peers = match self.reachable(&target.address()) {
            Ok(peers) => peers,
            Err(DhtError::Unreachable(_)) => return Ok(Digest::new()),
            Err(e) => return Err(e),
        };

        let mut digest = Digest::new();
        for peer in peers {
            digest.extend(peer.storage.digest(&target)?);
        }
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_dht::dht_value::DhtValue;
    use std::time::Duration;

    fn local_dht() -> LocalDht {
        LocalDht::new(DhtConfig::default(), LogHandle::disabled())
    }

    fn address() -> ContentAddress {
        ContentAddress::hashed("location", "content")
    }

    #[test]
    fn test_responsible_peers_are_closest() {
        let dht = local_dht();
        let location = DhtKey::hash_string("location");
        let responsible = dht.responsible(&location);

        assert_eq!(responsible.len(), 3);
        let farthest = responsible.iter().map(|p| p.id().distance(&location)).max().unwrap();
        for peer in dht.peers() {
            if !responsible.iter().any(|r| r.id() == peer.id()) {
                assert!(peer.id().distance(&location) > farthest);
            }
        }
    }

    #[tokio::test]
    async fn test_put_reaches_every_replica() {
        let dht = local_dht();
        let key = address().key(DhtKey::hash_string("v1"));

        let ack = dht.put(PutRequest::new(key, DhtValue::new(vec![1]))).await.unwrap();
        assert_eq!(ack, PutAck { acks: 3, replicas: 3 });

        let stored: usize = dht.peers().iter().map(|p| p.storage().size().unwrap()).sum();
        assert_eq!(stored, 3);
    }

    #[tokio::test]
    async fn test_offline_replica_reduces_acks() {
        let dht = local_dht();
        let key = address().key(DhtKey::hash_string("v1"));
        let offline = dht.responsible(&key.location)[0].id();
        dht.set_online(offline, false);

        let ack = dht.put(PutRequest::new(key, DhtValue::new(vec![1]))).await.unwrap();
        assert_eq!(ack.acks, 2);
        assert_eq!(ack.replicas, 3);
    }

    #[tokio::test]
    async fn test_all_replicas_offline() {
        let dht = local_dht();
        let key = address().key(DhtKey::hash_string("v1"));
        let responsible: Vec<DhtKey> = dht.responsible(&key.location).iter().map(|p| p.id()).collect();
        for peer in responsible {
            dht.set_online(peer, false);
        }

        let result = dht.put(PutRequest::new(key, DhtValue::new(vec![1]))).await;
        assert_eq!(result, Err(DhtError::Unreachable(address())));

        // reads degrade to empty
        assert!(dht.get(GetRequest::new(Target::key(key))).await.unwrap().is_empty());
        assert!(dht.digest(Target::all(address())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_value_too_large_is_rejected() {
        let dht = LocalDht::new(DhtConfig::default().with_max_value_size(4), LogHandle::disabled());
        let key = address().key(DhtKey::hash_string("v1"));

        let result = dht.put(PutRequest::new(key, DhtValue::new(vec![0; 5]))).await;
        assert_eq!(result, Err(DhtError::ValueTooLarge { size: 5, max: 4 }));
    }

    #[tokio::test]
    async fn test_remove_counts_distinct_entries() {
        let dht = local_dht();
        for n in 1..=3u8 {
            let key = address().key(DhtKey::from_slice(&[n]));
            dht.put(PutRequest::new(key, DhtValue::new(vec![n]))).await.unwrap();
        }

        let removed = dht.remove(RemoveRequest::new(Target::all(address()))).await.unwrap();
        assert_eq!(removed, 3);
        assert!(dht.digest(Target::all(address())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_values_expire_only_when_configured() {
        let key = address().key(DhtKey::hash_string("v1"));
        let stored_ttl = |dht: &LocalDht| {
            let records = dht.peers().iter().flat_map(|p| p.storage().get(&Target::key(key), Order::Ascending, None).unwrap());
            records.map(|r| r.value.ttl).collect::<Vec<_>>()
        };

        let dht = local_dht();
        dht.put(PutRequest::new(key, DhtValue::new(vec![1]))).await.unwrap();
        assert_eq!(stored_ttl(&dht), vec![None; 3]);

        let capped = LocalDht::new(DhtConfig::default().with_value_ttl(Duration::from_secs(60)), LogHandle::disabled());
        capped.put(PutRequest::new(key, DhtValue::new(vec![1]).with_ttl(3600))).await.unwrap();
        assert_eq!(stored_ttl(&capped), vec![Some(60); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_latency() {
        let config = DhtConfig::default().with_simulated_latency(Duration::from_secs(2));
        let dht = LocalDht::new(config, LogHandle::disabled());

        let start = tokio::time::Instant::now();
        dht.digest(Target::all(address())).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
