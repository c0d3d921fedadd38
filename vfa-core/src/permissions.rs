// SPDX-License-Identifier: AGPL-3.0-or-later
//! Permission bit matrix
//!
//! Permissions are a 3x3 matrix of (access class x permission kind) stored
//! with the same layout as Unix mode bits, so `0o754` means `rwxr-xr--`.
//! Each value carries a mask of the positions the backend actually knows
//! about; positions outside the mask always read as unset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who a permission bit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionAccess {
    User,
    Group,
    Other,
}

/// What a permission bit allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionKind {
    Read,
    Write,
    Execute,
}

impl PermissionAccess {
    pub const ALL: [PermissionAccess; 3] =
        [PermissionAccess::User, PermissionAccess::Group, PermissionAccess::Other];

    fn shift(self) -> u16 {
        match self {
            PermissionAccess::User => 6,
            PermissionAccess::Group => 3,
            PermissionAccess::Other => 0,
        }
    }
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 3] =
        [PermissionKind::Read, PermissionKind::Write, PermissionKind::Execute];

    fn bit(self) -> u16 {
        match self {
            PermissionKind::Read => 0o4,
            PermissionKind::Write => 0o2,
            PermissionKind::Execute => 0o1,
        }
    }

    fn symbol(self) -> char {
        match self {
            PermissionKind::Read => 'r',
            PermissionKind::Write => 'w',
            PermissionKind::Execute => 'x',
        }
    }
}

/// Bit position of `(access, kind)` in a mode value.
pub fn permission_bit(access: PermissionAccess, kind: PermissionKind) -> u16 {
    kind.bit() << access.shift()
}

/// Set of meaningful permission positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionMask(pub u16);

impl PermissionMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0o777);
    pub const USER: Self = Self(0o700);
    /// Only the owner's write bit, i.e. a read-only flag
    pub const USER_WRITE: Self = Self(0o200);

    pub fn contains(self, access: PermissionAccess, kind: PermissionKind) -> bool {
        self.0 & permission_bit(access, kind) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Every `(access, kind)` pair in the mask.
    pub fn positions(self) -> impl Iterator<Item = (PermissionAccess, PermissionKind)> {
        PermissionAccess::ALL
            .into_iter()
            .flat_map(|a| PermissionKind::ALL.into_iter().map(move |k| (a, k)))
            .filter(move |(a, k)| self.contains(*a, *k))
    }
}

/// Permission value plus the mask of bits that are meaningful for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilePermissions {
    bits: u16,
    mask: PermissionMask,
}

impl FilePermissions {
    pub fn new(bits: u16, mask: PermissionMask) -> Self {
        Self { bits: bits & 0o777, mask }
    }

    /// Permissions with every position meaningful.
    pub fn from_mode(mode: u32) -> Self {
        Self::new((mode & 0o777) as u16, PermissionMask::ALL)
    }

    pub fn mask(&self) -> PermissionMask {
        self.mask
    }

    pub fn get(&self, access: PermissionAccess, kind: PermissionKind) -> bool {
        let bit = permission_bit(access, kind);
        self.bits & bit != 0 && self.mask.0 & bit != 0
    }

    pub fn with(mut self, access: PermissionAccess, kind: PermissionKind, enabled: bool) -> Self {
        let bit = permission_bit(access, kind);
        if enabled {
            self.bits |= bit;
        } else {
            self.bits &= !bit;
        }
        self
    }

    /// Mode value with unmeaningful positions cleared.
    pub fn to_mode(&self) -> u16 {
        self.bits & self.mask.0
    }

    pub fn is_readable(&self) -> bool {
        self.get(PermissionAccess::User, PermissionKind::Read)
    }

    pub fn is_writable(&self) -> bool {
        self.get(PermissionAccess::User, PermissionKind::Write)
    }

    pub fn is_executable(&self) -> bool {
        self.get(PermissionAccess::User, PermissionKind::Execute)
    }
}

impl fmt::Display for FilePermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for access in PermissionAccess::ALL {
            for kind in PermissionKind::ALL {
                let c = if self.get(access, kind) { kind.symbol() } else { '-' };
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_layout() {
        assert_eq!(permission_bit(PermissionAccess::User, PermissionKind::Read), 0o400);
        assert_eq!(permission_bit(PermissionAccess::Group, PermissionKind::Write), 0o020);
        assert_eq!(permission_bit(PermissionAccess::Other, PermissionKind::Execute), 0o001);
    }

    #[test]
    fn test_get_respects_mask() {
        let perms = FilePermissions::new(0o777, PermissionMask::USER_WRITE);
        assert!(perms.get(PermissionAccess::User, PermissionKind::Write));
        assert!(!perms.get(PermissionAccess::User, PermissionKind::Read));
        assert!(!perms.get(PermissionAccess::Other, PermissionKind::Execute));
        assert_eq!(perms.to_mode(), 0o200);
    }

    #[test]
    fn test_with_toggles_single_bit() {
        let perms = FilePermissions::from_mode(0o640)
            .with(PermissionAccess::Other, PermissionKind::Read, true)
            .with(PermissionAccess::User, PermissionKind::Write, false);
        assert_eq!(perms.to_mode(), 0o444);
    }

    #[test]
    fn test_display() {
        assert_eq!(FilePermissions::from_mode(0o754).to_string(), "rwxr-xr--");
        assert_eq!(
            FilePermissions::new(0o777, PermissionMask::USER).to_string(),
            "rwx------"
        );
    }

    #[test]
    fn test_mask_positions() {
        let positions: Vec<_> = PermissionMask::USER.positions().collect();
        assert_eq!(positions.len(), 3);
        assert!(positions.iter().all(|(a, _)| *a == PermissionAccess::User));
        assert_eq!(PermissionMask::ALL.positions().count(), 9);
        assert_eq!(PermissionMask::NONE.positions().count(), 0);
    }
}
