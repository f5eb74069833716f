//! Slot protection as seen by the overlay
//!
//! The overlay only ever sees public keys. A protected slot remembers its
//! [`Protector`]; a mutation must carry a [`ProtectionProof`]: an ed25519
//! signature over the request bytes, made with the protector's secret key.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::fmt;

use super::dht_key::ContentAddress;
use super::errors::{DhtError, DhtResult};

/// Public half of a protection key pair
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protector([u8; 32]);

impl Protector {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Protector(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<VerifyingKey> for Protector {
    fn from(key: VerifyingKey) -> Self {
        Protector(key.to_bytes())
    }
}

impl fmt::Debug for Protector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Protector({})", hex::encode(&self.0[..8]))
    }
}

/// Proof that the requester holds the secret key of `protector`
#[derive(Debug, Clone)]
pub struct ProtectionProof {
    pub protector: Protector,
    pub signature: [u8; 64],
}

impl ProtectionProof {
    pub fn new(protector: Protector, signature: [u8; 64]) -> Self {
        ProtectionProof { protector, signature }
    }

    /// Verify the proof against the slot's current protector
    pub fn verify(
        &self,
        message: &[u8],
        address: &ContentAddress,
        expected: &Protector,
    ) -> DhtResult<()> {
        if self.protector != *expected {
            return Err(DhtError::ProtectionMismatch(*address));
        }
        let key = VerifyingKey::from_bytes(self.protector.as_bytes())
            .map_err(|e| DhtError::InvalidProof(e.to_string()))?;
        let signature = Signature::from_bytes(&self.signature);
        key.verify(message, &signature)
            .map_err(|_| DhtError::ProtectionMismatch(*address))
    }
}

/// Check a request against the protector of its slot, if any
pub fn authorize(
    current: Option<&Protector>,
    proof: Option<&ProtectionProof>,
    message: &[u8],
    address: &ContentAddress,
) -> DhtResult<()> {
    match (current, proof) {
        (None, _) => Ok(()),
        (Some(_), None) => Err(DhtError::ProtectionMismatch(*address)),
        (Some(expected), Some(proof)) => proof.verify(message, address, expected),
    }
}
