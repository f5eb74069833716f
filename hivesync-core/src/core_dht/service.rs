/*
    Service - the DHT contract consumed by the data manager.

    Responsibilities:
    `service.rs` defines the request/response types and the asynchronous
    `DhtService` trait the upper layers are written against:

    - put(four-part key, payload, old protector proof?, new protector) -> ack count | rejection
    - get(four-part key | range, order, limit) -> records
    - remove(four-part key | range, old protector proof?) -> removed count
    - digest(four-part key | range) -> keys (with their based-on links)

    Every call resolves asynchronously; callers decide how long to wait.
*/

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::dht_key::{ContentAddress, DhtKey, FourPartKey, VersionRange};
use super::dht_value::DhtValue;
use super::errors::DhtResult;
use super::protection::{ProtectionProof, Protector};

/// What an operation addresses: one exact version or a version range of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Key(FourPartKey),
    Range { address: ContentAddress, range: VersionRange },
}

impl Target {
    pub fn key(key: FourPartKey) -> Self {
        Target::Key(key)
    }

    pub fn range(address: ContentAddress, range: VersionRange) -> Self {
        Target::Range { address, range }
    }

    /// Every version of a slot
    pub fn all(address: ContentAddress) -> Self {
        Target::Range { address, range: VersionRange::full() }
    }

    pub fn address(&self) -> ContentAddress {
        match self {
            Target::Key(key) => key.address(),
            Target::Range { address, .. } => *address,
        }
    }

    pub fn matches(&self, key: &FourPartKey) -> bool {
        match self {
            Target::Key(exact) => exact == key,
            Target::Range { address, range } => {
                key.address() == *address && range.contains(&key.version)
            }
        }
    }

    /// Canonical bytes, signed when the target is mutated
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Target::Key(key) => {
                let mut bytes = vec![0u8];
                bytes.extend_from_slice(&key.to_bytes());
                bytes
            }
            Target::Range { address, range } => {
                let mut bytes = vec![1u8];
                bytes.extend_from_slice(&address.key(range.from).to_bytes());
                bytes.extend_from_slice(range.to.as_bytes());
                bytes
            }
        }
    }
}

impl From<FourPartKey> for Target {
    fn from(key: FourPartKey) -> Self {
        Target::Key(key)
    }
}

/// Result ordering for range reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// Store one value
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub key: FourPartKey,
    pub value: DhtValue,
    /// Proof by the slot's current protector (absent for a fresh slot)
    pub proof: Option<ProtectionProof>,
    /// Protector installed on success
    pub new_protector: Option<Protector>,
}

impl PutRequest {
    pub fn new(key: FourPartKey, value: DhtValue) -> Self {
        PutRequest { key, value, proof: None, new_protector: None }
    }

    /// Bytes the proof signs: operation tag, key, payload hash and new protector
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = b"put".to_vec();
        bytes.extend_from_slice(&self.key.to_bytes());
        bytes.extend_from_slice(&self.value.content_hash());
        if let Some(protector) = &self.new_protector {
            bytes.extend_from_slice(protector.as_bytes());
        }
        bytes
    }
}

/// Acknowledgement of a put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutAck {
    /// Replicas that stored the value
    pub acks: usize,
    /// Replicas responsible for the key
    pub replicas: usize,
}

/// Read values
#[derive(Debug, Clone, Copy)]
pub struct GetRequest {
    pub target: Target,
    pub order: Order,
    /// Maximum number of records returned (`returnNr`)
    pub limit: Option<usize>,
}

impl GetRequest {
    pub fn new(target: Target) -> Self {
        GetRequest { target, order: Order::Ascending, limit: None }
    }

    pub fn descending(mut self) -> Self {
        self.order = Order::Descending;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One stored value as returned by a read
#[derive(Debug, Clone)]
pub struct DhtRecord {
    pub key: FourPartKey,
    pub value: DhtValue,
    /// Protector of the slot at read time
    pub protector: Option<Protector>,
}

/// Remove values
#[derive(Debug, Clone)]
pub struct RemoveRequest {
    pub target: Target,
    pub proof: Option<ProtectionProof>,
}

impl RemoveRequest {
    pub fn new(target: Target) -> Self {
        RemoveRequest { target, proof: None }
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = b"remove".to_vec();
        bytes.extend_from_slice(&self.target.to_bytes());
        bytes
    }
}

/// Keys present for a target, each with the version it is based on
pub type Digest = BTreeMap<FourPartKey, Option<DhtKey>>;

/// The DHT overlay as consumed by the data layer
#[async_trait]
pub trait DhtService: Send + Sync {
    async fn put(&self, request: PutRequest) -> DhtResult<PutAck>;

    async fn get(&self, request: GetRequest) -> DhtResult<Vec<DhtRecord>>;

    /// Returns the number of distinct entries removed
    async fn remove(&self, request: RemoveRequest) -> DhtResult<usize>;

    async fn digest(&self, target: Target) -> DhtResult<Digest>;
}
