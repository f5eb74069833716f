/*
    Share folder process

    Grants a friend access to a folder by writing the next revision of the
    folder's meta document:

    1. get-meta-folder: latest revision of the meta folder (required; missing
       means the local view is inconsistent)
    2. put-meta-folder: successor revision with the friend's permission added,
       rotating the folder's protection keys taken from the context

    Sharing twice with the same friend is refused. Rolling back removes the new
    revision and puts the previous protector back in force.
*/

use super::builder::ProcessBuilder;
use super::context::Slot;
use super::data_steps::{ProtectionSource, PutContent};
use super::env::ExecutionEnv;
use super::process::Process;
use super::step::ProcessStep;
use crate::core_data::{
    MetaFolder, PermissionType, ProtectionKeys, StoredEntry, UserPermission, VersionedEntry,
};
use crate::core_dht::{ContentAddress, Target};

/// Meta folder fetched by the first step
pub const META_FOLDER: Slot<StoredEntry> = Slot::new("meta_folder");

/// Key transition for the meta folder put
pub const SHARE_KEYS: Slot<ProtectionKeys> = Slot::new("share_protection_keys");

pub const GET_META_FOLDER: &str = "get-meta-folder";
pub const PUT_META_FOLDER: &str = "put-meta-folder";

/// Parameters of a share
#[derive(Debug, Clone)]
pub struct ShareFolder {
    folder: ContentAddress,
    friend: String,
    permission: PermissionType,
}

impl ShareFolder {
    /// Share `folder` with `friend`, granting write access
    pub fn new(folder: ContentAddress, friend: impl Into<String>) -> Self {
        ShareFolder { folder, friend: friend.into(), permission: PermissionType::Write }
    }

    pub fn with_permission(mut self, permission: PermissionType) -> Self {
        self.permission = permission;
        self
    }

    /// Process sharing the folder; `keys` rotate the meta folder's protection
    pub fn build(self, keys: ProtectionKeys, env: ExecutionEnv) -> Process {
        let ShareFolder { folder, friend, permission } = self;
        let derive = move |stored: StoredEntry| add_permission(stored, &friend, permission);

        ProcessBuilder::new("share-folder")
            .seed(SHARE_KEYS, keys)
            .step(ProcessStep::get_required(
                GET_META_FOLDER,
                Target::all(folder),
                META_FOLDER,
                "inconsistent state: meta folder not found",
            ))
            .step(ProcessStep::put(
                PUT_META_FOLDER,
                folder,
                PutContent::derived(META_FOLDER, derive),
                ProtectionSource::Slot(SHARE_KEYS),
            ))
            .build(env)
    }
}

fn add_permission(
    stored: StoredEntry,
    friend: &str,
    permission: PermissionType,
) -> Result<VersionedEntry, String> {
    let mut folder = MetaFolder::from_entry(&stored.entry)
        .map_err(|e| format!("inconsistent state: unreadable meta folder ({})", e))?;
    if !folder.add_permission(UserPermission::new(friend, permission)) {
        return Err(format!("already shared with {}", friend));
    }
    let next = folder.to_entry().map_err(|e| e.to_string())?;
    Ok(stored.entry.successor(next.content))
}
