// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform bridge
//!
//! Native calls that std does not cover portably (full permission bits,
//! volume space, ownership) sit behind [`PlatformBridge`]. The core only
//! talks to the trait; each OS gets its own implementation.

use std::path::Path;

use crate::error::{VfaError, VfaResult};
use crate::operation::Operation;
use crate::permissions::{FilePermissions, PermissionMask};

/// Volume space figures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceInfo {
    pub total: u64,
    pub free: u64,
}

impl SpaceInfo {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.free)
    }
}

/// OS-specific operations used by the local backend
pub trait PlatformBridge: Send + Sync {
    fn name(&self) -> &str;

    /// Permission positions this platform reports meaningfully.
    fn readable_permissions(&self) -> PermissionMask;

    /// Permission positions this platform can change.
    fn changeable_permissions(&self) -> PermissionMask;

    fn permissions(&self, metadata: &std::fs::Metadata) -> FilePermissions;

    fn set_permissions(&self, path: &Path, mode: u16) -> VfaResult<()>;

    fn owner(&self, _metadata: &std::fs::Metadata) -> (Option<String>, Option<String>) {
        (None, None)
    }

    fn supports_space_queries(&self) -> bool {
        false
    }

    fn volume_space(&self, _path: &Path) -> VfaResult<SpaceInfo> {
        Err(VfaError::NotImplemented(Operation::GetFreeSpace))
    }
}

/// Bridge restricted to what std exposes everywhere: the read-only flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortablePlatform;

impl PlatformBridge for PortablePlatform {
    fn name(&self) -> &str {
        "portable"
    }

    fn readable_permissions(&self) -> PermissionMask {
        PermissionMask::USER_WRITE
    }

    fn changeable_permissions(&self) -> PermissionMask {
        PermissionMask::USER_WRITE
    }

    fn permissions(&self, metadata: &std::fs::Metadata) -> FilePermissions {
        let bits = if metadata.permissions().readonly() { 0 } else { 0o200 };
        FilePermissions::new(bits, self.readable_permissions())
    }

    fn set_permissions(&self, path: &Path, mode: u16) -> VfaResult<()> {
        let mut perms = std::fs::metadata(path)
            .map_err(|e| VfaError::from_io(e, path.display().to_string()))?
            .permissions();
        perms.set_readonly(mode & 0o200 == 0);
        std::fs::set_permissions(path, perms)
            .map_err(|e| VfaError::from_io(e, path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{PermissionAccess, PermissionKind};

    #[test]
    fn test_portable_read_only_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let bridge = PortablePlatform;
        bridge.set_permissions(&path, 0o444).unwrap();
        let perms = bridge.permissions(&std::fs::metadata(&path).unwrap());
        assert!(!perms.get(PermissionAccess::User, PermissionKind::Write));

        bridge.set_permissions(&path, 0o644).unwrap();
        let perms = bridge.permissions(&std::fs::metadata(&path).unwrap());
        assert!(perms.get(PermissionAccess::User, PermissionKind::Write));
        // Not meaningful on this bridge, so always unset.
        assert!(!perms.get(PermissionAccess::User, PermissionKind::Read));
    }

    #[test]
    fn test_space_used() {
        let info = SpaceInfo { total: 100, free: 30 };
        assert_eq!(info.used(), 70);
    }
}
