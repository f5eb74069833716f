/*
    DhtKey - defines how keys are hashed into the DHT keyspace

    Responsibilities:
    `dht_key.rs` defines the key representations used to address stored entries.
    It handles: hashing into the 256-bit keyspace (Blake3), the ZERO/MAX sentinels,
    XOR distance (replica selection), and the composite four-part key
    (location, domain, content, version) with its range queries.

    Inputs:
    - raw byte arrays
    - application domain keys (username, content slot name, version stamps)

    Outputs:
    - 256-bit DHT keys
    - four-part keys and version ranges
    - key distance calculations
*/

use serde::{Deserialize, Serialize};
use std::fmt;

/// 256-bit DHT key for XOR-based keyspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DhtKey([u8; 32]);

impl DhtKey {
    /// Lowest key in the keyspace, the open lower bound of a range
    pub const ZERO: DhtKey = DhtKey([0u8; 32]);

    /// Highest key in the keyspace, the open upper bound of a range
    pub const MAX: DhtKey = DhtKey([0xFF; 32]);

    /// Create a DhtKey from raw 32 bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        DhtKey(bytes)
    }

    /// Create a DhtKey from a slice (truncates or pads to 32 bytes)
    pub fn from_slice(data: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        let len = data.len().min(32);
        bytes[..len].copy_from_slice(&data[..len]);
        DhtKey(bytes)
    }

    /// Hash arbitrary data using Blake3 and use full 256 bits
    pub fn hash(data: &[u8]) -> Self {
        DhtKey(*blake3::hash(data).as_bytes())
    }

    /// Hash a string into the DHT keyspace
    pub fn hash_string(s: &str) -> Self {
        Self::hash(s.as_bytes())
    }

    /// Calculate XOR distance between two keys
    pub fn distance(&self, other: &DhtKey) -> DhtKey {
        let mut result = [0u8; 32];
        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        DhtKey(result)
    }

    /// Check if this key is closer to a target than another key
    pub fn is_closer(&self, other: &DhtKey, target: &DhtKey) -> bool {
        self.distance(target) < other.distance(target)
    }

    /// The next key in big-endian order, `None` for `MAX`
    pub fn successor(&self) -> Option<DhtKey> {
        let mut bytes = self.0;
        for byte in bytes.iter_mut().rev() {
            if *byte == 0xFF {
                *byte = 0;
            } else {
                *byte += 1;
                return Some(DhtKey(bytes));
            }
        }
        None
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to Vec<u8>
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for DhtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 8 bytes are enough to tell keys apart in logs
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl From<[u8; 32]> for DhtKey {
    fn from(bytes: [u8; 32]) -> Self {
        DhtKey(bytes)
    }
}

impl From<DhtKey> for [u8; 32] {
    fn from(key: DhtKey) -> Self {
        key.0
    }
}

/// A logical slot: every version of one piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentAddress {
    /// Responsible storage neighborhood (e.g. hash of a username)
    pub location: DhtKey,
    /// Ownership partition within the location
    pub domain: DhtKey,
    /// Logical slot name (e.g. "meta-folder")
    pub content: DhtKey,
}

impl ContentAddress {
    pub fn new(location: DhtKey, domain: DhtKey, content: DhtKey) -> Self {
        ContentAddress { location, domain, content }
    }

    /// Address in the default domain, hashing both names
    pub fn hashed(location: &str, content: &str) -> Self {
        ContentAddress::new(DhtKey::hash_string(location), DhtKey::ZERO, DhtKey::hash_string(content))
    }

    /// Same address in another domain
    pub fn with_domain(mut self, domain: DhtKey) -> Self {
        self.domain = domain;
        self
    }

    /// Full key of one version in this slot
    pub fn key(&self, version: DhtKey) -> FourPartKey {
        FourPartKey {
            location: self.location,
            domain: self.domain,
            content: self.content,
            version,
        }
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.location, self.domain, self.content)
    }
}

/// Address of exactly one stored entry
///
/// Ordering is lexicographic over (location, domain, content, version), so all
/// versions of a slot are contiguous and sorted by version key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FourPartKey {
    pub location: DhtKey,
    pub domain: DhtKey,
    pub content: DhtKey,
    pub version: DhtKey,
}

impl FourPartKey {
    pub fn new(location: DhtKey, domain: DhtKey, content: DhtKey, version: DhtKey) -> Self {
        FourPartKey { location, domain, content, version }
    }

    /// The slot this key belongs to
    pub fn address(&self) -> ContentAddress {
        ContentAddress::new(self.location, self.domain, self.content)
    }

    /// Canonical 128-byte encoding, used in signed requests
    pub fn to_bytes(&self) -> [u8; 128] {
        let mut bytes = [0u8; 128];
        bytes[..32].copy_from_slice(self.location.as_bytes());
        bytes[32..64].copy_from_slice(self.domain.as_bytes());
        bytes[64..96].copy_from_slice(self.content.as_bytes());
        bytes[96..].copy_from_slice(self.version.as_bytes());
        bytes
    }
}

impl fmt::Display for FourPartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.location, self.domain, self.content, self.version)
    }
}

/// Half-open range `[from, to)` over the version component
///
/// `to == DhtKey::MAX` is the open-ended sentinel and includes `MAX` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRange {
    pub from: DhtKey,
    pub to: DhtKey,
}

impl VersionRange {
    pub fn new(from: DhtKey, to: DhtKey) -> Self {
        VersionRange { from, to }
    }

    /// `[ZERO, MAX]`: every version
    pub fn full() -> Self {
        VersionRange { from: DhtKey::ZERO, to: DhtKey::MAX }
    }

    /// The range holding exactly `version`
    pub fn single(version: DhtKey) -> Self {
        VersionRange { from: version, to: version.successor().unwrap_or(DhtKey::MAX) }
    }

    pub fn contains(&self, version: &DhtKey) -> bool {
        if self.to == DhtKey::MAX {
            *version >= self.from
        } else {
            *version >= self.from && *version < self.to
        }
    }

    /// True if no version can fall in the range
    pub fn is_empty(&self) -> bool {
        if self.to == DhtKey::MAX {
            false
        } else {
            self.to <= self.from
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dht_key_from_slice() {
        let data = vec![1, 2, 3, 4, 5];
        let key = DhtKey::from_slice(&data);

        let bytes = key.as_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[4], 5);
        assert_eq!(bytes[5], 0); // Padded
    }

    #[test]
    fn test_dht_key_hash_string() {
        let key1 = DhtKey::hash_string("alice");
        let key2 = DhtKey::hash_string("alice");
        let key3 = DhtKey::hash_string("bob");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_dht_key_distance_symmetric() {
        let key1 = DhtKey::hash_string("alice");
        let key2 = DhtKey::hash_string("bob");

        assert_eq!(key1.distance(&key2), key2.distance(&key1));
        assert_eq!(key1.distance(&key1), DhtKey::ZERO);
    }

    #[test]
    fn test_dht_key_is_closer() {
        let target = DhtKey::from_bytes([0xFF; 32]);
        let key1 = DhtKey::from_bytes([0xFE; 32]);
        let key2 = DhtKey::from_bytes([0x00; 32]);

        assert!(key1.is_closer(&key2, &target));
        assert!(!key2.is_closer(&key1, &target));
    }

    #[test]
    fn test_dht_key_successor() {
        let mut bytes = [0u8; 32];
        bytes[31] = 0xFF;
        let key = DhtKey::from_bytes(bytes);

        let mut expected = [0u8; 32];
        expected[30] = 1;
        assert_eq!(key.successor(), Some(DhtKey::from_bytes(expected)));
        assert_eq!(DhtKey::MAX.successor(), None);
        assert!(DhtKey::ZERO.successor().unwrap() > DhtKey::ZERO);
    }

    #[test]
    fn test_dht_key_display() {
        let key = DhtKey::from_bytes([0xAB; 32]);
        assert_eq!(format!("{}", key), "abababababababab");
    }

    #[test]
    fn test_four_part_key_orders_by_version_within_slot() {
        let address = ContentAddress::hashed("location", "content");
        let low = address.key(DhtKey::from_slice(&[1]));
        let high = address.key(DhtKey::from_slice(&[2]));

        assert!(low < high);
        assert_eq!(low.address(), address);
    }

    #[test]
    fn test_four_part_key_bytes() {
        let key = FourPartKey::new(DhtKey::ZERO, DhtKey::MAX, DhtKey::ZERO, DhtKey::MAX);
        let bytes = key.to_bytes();

        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[32], 0xFF);
        assert_eq!(bytes[64], 0);
        assert_eq!(bytes[127], 0xFF);
    }

    #[test]
    fn test_version_range_full_contains_sentinels() {
        let range = VersionRange::full();
        assert!(range.contains(&DhtKey::ZERO));
        assert!(range.contains(&DhtKey::MAX));
        assert!(!range.is_empty());
    }

    #[test]
    fn test_version_range_single() {
        let version = DhtKey::hash_string("v1");
        let range = VersionRange::single(version);

        assert!(range.contains(&version));
        assert!(!range.contains(&version.successor().unwrap()));
        assert!(VersionRange::single(DhtKey::MAX).contains(&DhtKey::MAX));
    }

    #[test]
    fn test_version_range_empty() {
        let a = DhtKey::from_slice(&[5]);
        let b = DhtKey::from_slice(&[9]);

        assert!(VersionRange::new(a, a).is_empty());
        assert!(VersionRange::new(b, a).is_empty());
        assert!(!VersionRange::new(b, a).contains(&b));
        assert!(!VersionRange::new(a, b).is_empty());
    }

    #[test]
    fn test_dht_key_serialization() {
        let key = DhtKey::hash_string("test_key");

        let serialized = serde_json::to_string(&key).unwrap();
        let deserialized: DhtKey = serde_json::from_str(&serialized).unwrap();

        assert_eq!(key, deserialized);
    }
}
