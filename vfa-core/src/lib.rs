// SPDX-License-Identifier: AGPL-3.0-or-later
//! VFA Core
//!
//! One node type for every place a file can live: local disk, memory,
//! remote stores, or the inside of an archive. Backends declare which
//! operations they support and every node call is checked against that
//! declaration before it is dispatched.

pub mod archive;
pub mod backend;
pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;
pub mod location;
pub mod metadata;
pub mod node;
pub mod operation;
pub mod ordering;
pub mod permissions;
pub mod platform;
pub mod registry;
pub mod stream;
pub mod vfs;

#[cfg(test)]
mod testing;

pub use archive::{ArchiveEntry, ArchiveFormat, ArchiveIndex, ArchiveLayer, Signature};
pub use backend::{Backend, InputStream, OutputStream};
pub use cache::CacheStats;
pub use checksum::{ChecksumRegistry, StreamDigest};
pub use config::VfsConfig;
pub use error::{TransferError, VfaError, VfaResult};
pub use location::{Credentials, Location, LOCAL_SCHEME};
pub use metadata::{EntryKind, Metadata};
pub use node::Node;
pub use operation::{Operation, OperationSet};
pub use ordering::{SortCriterion, SortKey};
pub use permissions::{FilePermissions, PermissionAccess, PermissionKind, PermissionMask};
pub use platform::{PlatformBridge, PortablePlatform, SpaceInfo};
pub use registry::ProviderRegistry;
pub use stream::{RandomRead, RandomWrite};
pub use vfs::Vfs;
