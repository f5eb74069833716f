//! DHT overlay contract and the in-process reference overlay
//!
//! The data layer only depends on [`DhtService`]; [`LocalDht`] implements it
//! over in-process peers.

pub mod dht_config;
pub mod dht_key;
pub mod dht_storage;
pub mod dht_value;
pub mod errors;
pub mod local;
pub mod protection;
pub mod service;

pub use dht_config::DhtConfig;
pub use dht_key::{ContentAddress, DhtKey, FourPartKey, VersionRange};
pub use dht_storage::DhtStorage;
pub use dht_value::DhtValue;
pub use errors::{DhtError, DhtResult};
pub use local::{LocalDht, LocalPeer};
pub use protection::{ProtectionProof, Protector};
pub use service::{
    Digest, DhtRecord, DhtService, GetRequest, Order, PutAck, PutRequest, RemoveRequest, Target,
};
