// SPDX-License-Identifier: AGPL-3.0-or-later
//! Capability model
//!
//! [`Operation`] is the closed set of file operations a node may expose.
//! Discriminants are part of the public surface: entries are only ever
//! appended, never renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A file operation a backend may or may not support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Operation {
    Exists = 0,
    List = 1,
    Read = 2,
    RandomRead = 3,
    Write = 4,
    Append = 5,
    RandomWrite = 6,
    CreateFile = 7,
    CreateDirectory = 8,
    Delete = 9,
    Rename = 10,
    Move = 11,
    Copy = 12,
    CopyRemote = 13,
    ChangePermission = 14,
    ChangeDate = 15,
    GetFreeSpace = 16,
    GetTotalSpace = 17,
}

impl Operation {
    pub const ALL: [Operation; 18] = [
        Operation::Exists,
        Operation::List,
        Operation::Read,
        Operation::RandomRead,
        Operation::Write,
        Operation::Append,
        Operation::RandomWrite,
        Operation::CreateFile,
        Operation::CreateDirectory,
        Operation::Delete,
        Operation::Rename,
        Operation::Move,
        Operation::Copy,
        Operation::CopyRemote,
        Operation::ChangePermission,
        Operation::ChangeDate,
        Operation::GetFreeSpace,
        Operation::GetTotalSpace,
    ];

    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Exists => "exists",
            Operation::List => "list",
            Operation::Read => "read",
            Operation::RandomRead => "random read",
            Operation::Write => "write",
            Operation::Append => "append",
            Operation::RandomWrite => "random write",
            Operation::CreateFile => "create file",
            Operation::CreateDirectory => "create directory",
            Operation::Delete => "delete",
            Operation::Rename => "rename",
            Operation::Move => "move",
            Operation::Copy => "copy",
            Operation::CopyRemote => "copy remote",
            Operation::ChangePermission => "change permission",
            Operation::ChangeDate => "change date",
            Operation::GetFreeSpace => "get free space",
            Operation::GetTotalSpace => "get total space",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of operations, usable in `const` declarations
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OperationSet(u32);

impl OperationSet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self((1u32 << Operation::ALL.len() as u32) - 1);

    /// Exists, List, Read and RandomRead
    pub const READ_ONLY: Self = Self::EMPTY
        .with(Operation::Exists)
        .with(Operation::List)
        .with(Operation::Read)
        .with(Operation::RandomRead);

    pub const fn with(self, op: Operation) -> Self {
        Self(self.0 | (1 << op as u32))
    }

    pub const fn without(self, op: Operation) -> Self {
        Self(self.0 & !(1 << op as u32))
    }

    pub const fn contains(self, op: Operation) -> bool {
        self.0 & (1 << op as u32) != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Operation> {
        Operation::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl FromIterator<Operation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, |set, op| set.with(op))
    }
}

impl fmt::Debug for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable() {
        for (i, op) in Operation::ALL.iter().enumerate() {
            assert_eq!(op.id() as usize, i);
            assert_eq!(Operation::from_id(i as u8), Some(*op));
        }
        assert_eq!(Operation::GetTotalSpace.id(), 17);
        assert_eq!(Operation::from_id(18), None);
    }

    #[test]
    fn test_set_operations() {
        const SET: OperationSet = OperationSet::EMPTY
            .with(Operation::Read)
            .with(Operation::Write);

        assert!(SET.contains(Operation::Read));
        assert!(SET.contains(Operation::Write));
        assert!(!SET.contains(Operation::Delete));
        assert_eq!(SET.len(), 2);
        assert!(!SET.without(Operation::Read).contains(Operation::Read));
    }

    #[test]
    fn test_all_contains_everything() {
        for op in Operation::ALL {
            assert!(OperationSet::ALL.contains(op));
        }
        assert_eq!(OperationSet::ALL.len(), Operation::ALL.len());
        assert!(OperationSet::EMPTY.is_empty());
    }

    #[test]
    fn test_iter_and_collect() {
        let set: OperationSet = [Operation::List, Operation::Exists].into_iter().collect();
        let ops: Vec<_> = set.iter().collect();
        assert_eq!(ops, vec![Operation::Exists, Operation::List]);
    }
}
