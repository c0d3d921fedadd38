// SPDX-License-Identifier: AGPL-3.0-or-later
//! File and directory attributes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::permissions::FilePermissions;

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// Attributes of an existing entry, as reported by a backend for one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub permissions: Option<FilePermissions>,
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl Metadata {
    pub fn file(size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            size,
            modified: None,
            permissions: None,
            owner: None,
            group: None,
        }
    }

    pub fn directory() -> Self {
        Self { kind: EntryKind::Directory, ..Self::file(0) }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_permissions(mut self, permissions: FilePermissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Size for display and ordering; directories count as zero.
    pub fn display_size(&self) -> u64 {
        if self.is_directory() {
            0
        } else {
            self.size
        }
    }
}
