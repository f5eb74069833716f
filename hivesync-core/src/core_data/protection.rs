//! Protection key pairs and the per-process key manager
//!
//! A [`ProtectionKeyPair`] is the secret side of a slot [`Protector`]. Every
//! mutation carries a [`ProtectionKeys`] set: `old` proves the right to touch
//! the slot, `new` is installed as its protector when the mutation succeeds.
//! [`ProtectionKeyManager`] remembers which protector guards which slot and
//! which key pairs the process holds, and derives those sets.

use ed25519_dalek::{Signer, SigningKey};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use super::errors::{DataError, DataResult};
use crate::core_dht::{ContentAddress, ProtectionProof, Protector};

/// Key pair whose possession authorizes mutation of a protected slot
#[derive(Clone)]
pub struct ProtectionKeyPair {
    signing: SigningKey,
}

impl ProtectionKeyPair {
    /// Generate a random key pair
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill(&mut seed);
        Self::from_seed(seed)
    }

    /// Deterministic key pair
    pub fn from_seed(seed: [u8; 32]) -> Self {
        ProtectionKeyPair { signing: SigningKey::from_bytes(&seed) }
    }

    pub fn protector(&self) -> Protector {
        self.signing.verifying_key().into()
    }

    /// Sign `message`
    pub fn prove(&self, message: &[u8]) -> ProtectionProof {
        ProtectionProof::new(self.protector(), self.signing.sign(message).to_bytes())
    }
}

impl PartialEq for ProtectionKeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.protector() == other.protector()
    }
}

impl Eq for ProtectionKeyPair {}

impl fmt::Debug for ProtectionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print the secret half
        f.debug_struct("ProtectionKeyPair").field("protector", &self.protector()).finish()
    }
}

/// Key transition of one mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionKeys {
    /// Key of the slot's current protector, absent for an unprotected slot
    pub old: Option<ProtectionKeyPair>,
    /// Key installed by a successful put, absent to leave protection as is
    pub new: Option<ProtectionKeyPair>,
}

impl ProtectionKeys {
    pub fn unprotected() -> Self {
        ProtectionKeys::default()
    }

    /// Protect a fresh slot with `new`
    pub fn fresh(new: ProtectionKeyPair) -> Self {
        ProtectionKeys { old: None, new: Some(new) }
    }

    /// Replace the protector `old` with `new`
    pub fn rotate(old: ProtectionKeyPair, new: ProtectionKeyPair) -> Self {
        ProtectionKeys { old: Some(old), new: Some(new) }
    }

    /// Mutate under `pair` and keep it as protector
    pub fn keep(pair: ProtectionKeyPair) -> Self {
        ProtectionKeys { old: Some(pair.clone()), new: Some(pair) }
    }

    /// Keys undoing this transition: prove with the key in force after it,
    /// install the one in force before it
    pub fn reversed(&self) -> Self {
        ProtectionKeys {
            old: self.new.clone().or_else(|| self.old.clone()),
            new: self.old.clone(),
        }
    }

    /// True if a successful put changes the slot's protector
    pub fn rotates(&self) -> bool {
        match (&self.old, &self.new) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(old), Some(new)) => old != new,
        }
    }

    pub fn new_protector(&self) -> Option<Protector> {
        self.new.as_ref().map(ProtectionKeyPair::protector)
    }

    /// Proof by the old key over `message`
    pub fn prove(&self, message: &[u8]) -> Option<ProtectionProof> {
        self.old.as_ref().map(|pair| pair.prove(message))
    }
}

#[derive(Default)]
struct KeyringInner {
    keyring: HashMap<Protector, ProtectionKeyPair>,
    current: HashMap<ContentAddress, Protector>,
}

/// Tracks protectors of the slots a process touches
#[derive(Default)]
pub struct ProtectionKeyManager {
    inner: Mutex<KeyringInner>,
}

impl ProtectionKeyManager {
    pub fn new() -> Self {
        ProtectionKeyManager::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, KeyringInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `pair` available for proofs
    pub fn add_key(&self, pair: ProtectionKeyPair) -> Protector {
        let protector = pair.protector();
        self.lock().keyring.insert(protector, pair);
        protector
    }

    /// Record the protector a read reported for `address`
    pub fn observe(&self, address: ContentAddress, protector: Option<Protector>) {
        let mut inner = self.lock();
        match protector {
            Some(protector) => inner.current.insert(address, protector),
            None => inner.current.remove(&address),
        };
    }

    /// Protector last seen for `address`
    pub fn protector(&self, address: &ContentAddress) -> Option<Protector> {
        self.lock().current.get(address).copied()
    }

    fn old_pair(inner: &KeyringInner, address: &ContentAddress) -> DataResult<Option<ProtectionKeyPair>> {
        match inner.current.get(address) {
            None => Ok(None),
            Some(protector) => inner
                .keyring
                .get(protector)
                .cloned()
                .map(Some)
                .ok_or(DataError::ProtectionKeyUnavailable(*address)),
        }
    }

    /// Keys for a mutation that keeps the slot's protection unchanged
    pub fn current(&self, address: &ContentAddress) -> DataResult<ProtectionKeys> {
        let inner = self.lock();
        Ok(match Self::old_pair(&inner, address)? {
            Some(pair) => ProtectionKeys::keep(pair),
            None => ProtectionKeys::unprotected(),
        })
    }

    /// Keys for a put that installs `new` as protector of `address`
    pub fn transition(&self, address: &ContentAddress, new: ProtectionKeyPair) -> DataResult<ProtectionKeys> {
        let mut inner = self.lock();
        let old = Self::old_pair(&inner, address)?;
        inner.keyring.insert(new.protector(), new.clone());
        Ok(ProtectionKeys { old, new: Some(new) })
    }

    /// Record a successful put made with `keys`
    pub fn record_put(&self, address: ContentAddress, keys: &ProtectionKeys) {
        let mut inner = self.lock();
        if let Some(new) = &keys.new {
            inner.keyring.insert(new.protector(), new.clone());
            inner.current.insert(address, new.protector());
        }
    }

    /// Record a successful remove; an emptied slot loses its protector
    pub fn record_remove(&self, address: ContentAddress, slot_empty: bool) {
        if slot_empty {
            self.lock().current.remove(&address);
        }
    }
}
