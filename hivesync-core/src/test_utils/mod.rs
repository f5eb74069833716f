//! Test utilities shared by unit tests, integration tests and benches

pub mod async_helpers;
pub mod deterministic_rng;
pub mod fixtures;
pub mod network;

pub use async_helpers::*;
pub use deterministic_rng::*;
pub use fixtures::*;
pub use network::{FaultyDht, TestNetwork};
