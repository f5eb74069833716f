//! Versioned, protection-controlled data layer
//!
//! [`DataManager`] maps put/get/remove/digest intents onto the overlay,
//! [`VersionedEntry`] is the stored unit and [`ProtectionKeyManager`] derives
//! the key transitions mutations need.

pub mod data_config;
pub mod errors;
pub mod manager;
pub mod model;
pub mod protection;
pub mod versioned;

pub use data_config::DataConfig;
pub use errors::{DataError, DataResult};
pub use manager::{DataManager, StoredEntry, UndoOutcome};
pub use model::{MetaFolder, PermissionType, UserPermission};
pub use protection::{ProtectionKeyManager, ProtectionKeyPair, ProtectionKeys};
pub use versioned::VersionedEntry;
