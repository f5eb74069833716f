/*
    model.rs - meta-document model

    The parts of a shared folder's meta document the data layer needs: the
    folder name, its owner and the list of user permissions. Stored as the
    payload of a `VersionedEntry`.
*/

use serde::{Deserialize, Serialize};

use super::errors::DataResult;
use super::versioned::VersionedEntry;

/// Access level granted to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionType {
    Read,
    Write,
}

/// Permission of one user on a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
    pub user_id: String,
    pub permission: PermissionType,
}

impl UserPermission {
    pub fn new(user_id: impl Into<String>, permission: PermissionType) -> Self {
        UserPermission { user_id: user_id.into(), permission }
    }
}

/// Meta document of a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFolder {
    pub name: String,
    /// Owner (immutable)
    pub owner: String,
    pub permissions: Vec<UserPermission>,
}

impl MetaFolder {
    /// New folder; the owner holds write permission
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        MetaFolder {
            name: name.into(),
            permissions: vec![UserPermission::new(owner.clone(), PermissionType::Write)],
            owner,
        }
    }

    pub fn permission_of(&self, user_id: &str) -> Option<&UserPermission> {
        self.permissions.iter().find(|p| p.user_id == user_id)
    }

    pub fn is_shared_with(&self, user_id: &str) -> bool {
        self.permission_of(user_id).is_some()
    }

    /// Add a permission; false if the user already holds one
    pub fn add_permission(&mut self, permission: UserPermission) -> bool {
        if self.is_shared_with(&permission.user_id) {
            return false;
        }
        self.permissions.push(permission);
        true
    }

    /// Root revision holding this folder
    pub fn to_entry(&self) -> DataResult<VersionedEntry> {
        VersionedEntry::from_value(self)
    }

    pub fn from_entry(entry: &VersionedEntry) -> DataResult<Self> {
        entry.content_as()
    }
}
