/*!
    Deterministic RNG helpers for reproducible tests

    Seeds the payloads and protection keys used by integration tests and
    benches so a failing run can be replayed.
*/

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default seed for deterministic tests
pub const DEFAULT_TEST_SEED: u64 = 42;

/// Create a deterministic RNG with the default seed
pub fn test_rng() -> StdRng {
    test_rng_with_seed(DEFAULT_TEST_SEED)
}

/// Create a deterministic RNG with a custom seed
pub fn test_rng_with_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Deterministic payload of `len` bytes
pub fn deterministic_bytes_with_seed(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = test_rng_with_seed(seed);
    (0..len).map(|_| rng.random()).collect()
}

/// Deterministic 32-byte seed, suitable for a protection key pair
pub fn deterministic_seed(seed: u64) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    test_rng_with_seed(seed).fill(&mut bytes);
    bytes
}
