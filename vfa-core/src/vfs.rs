// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resolution
//!
//! [`Vfs`] turns text or a [`Location`] into a [`Node`]. Each canonical
//! location maps to at most one live node: lookups go through the identity
//! cache, and a node built concurrently for the same location loses to the
//! one published first.
//!
//! A path enters an archive only below an existing file whose content
//! matches the archive format. Cached nodes under archive-named segments
//! are checked against that rule on every lookup and replaced when an
//! archive has appeared or gone away since they were built.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::path::Path;
use std::sync::Arc;

use crate::archive::{ArchiveFormat, ArchiveLayer};
use crate::cache::{CacheStats, IdentityCache};
use crate::checksum::ChecksumRegistry;
use crate::config::VfsConfig;
use crate::error::VfaResult;
use crate::location::Location;
use crate::node::{Backing, EntryRef, Node};
use crate::registry::ProviderRegistry;

struct VfsShared {
    registry: RwLock<ProviderRegistry>,
    cache: IdentityCache,
    checksums: ChecksumRegistry,
    config: VfsConfig,
}

/// Entry point for resolving locations into nodes
#[derive(Clone)]
pub struct Vfs {
    shared: Arc<VfsShared>,
}

impl Vfs {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self::with_config(registry, VfsConfig::default())
    }

    pub fn with_config(registry: ProviderRegistry, config: VfsConfig) -> Self {
        Self {
            shared: Arc::new(VfsShared {
                registry: RwLock::new(registry),
                cache: IdentityCache::new(config.purge_interval),
                checksums: ChecksumRegistry::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.shared.config
    }

    pub fn checksums(&self) -> &ChecksumRegistry {
        &self.shared.checksums
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, ProviderRegistry> {
        self.shared.registry.read()
    }

    /// Write access to the registry. Nodes already resolved keep the
    /// backend they were built with.
    pub fn registry_mut(&self) -> RwLockWriteGuard<'_, ProviderRegistry> {
        self.shared.registry.write()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Drop identity cache slots whose node has died.
    pub fn purge(&self) -> usize {
        self.shared.cache.purge()
    }

    /// Resolve a URL or an absolute local path.
    pub fn resolve(&self, text: &str) -> VfaResult<Arc<Node>> {
        self.resolve_location(&Location::parse(text)?)
    }

    pub fn resolve_path(&self, path: &Path) -> VfaResult<Arc<Node>> {
        self.resolve_location(&Location::from_path(path)?)
    }

    pub fn resolve_location(&self, location: &Location) -> VfaResult<Arc<Node>> {
        self.resolve_at_depth(location, 0)
    }

    fn resolve_at_depth(&self, location: &Location, depth: usize) -> VfaResult<Arc<Node>> {
        let key = location.without_credentials();
        let cached = self.shared.cache.get(&key);

        let node = match cached {
            Some(node) if !self.may_be_in_archive(location) => node,
            cached => {
                // Archives appear and disappear under cached nodes.
                let archive = self.enclosing_archive(location, depth)?;
                let owner = archive.as_ref().map(|(owner, _)| owner);
                match cached {
                    Some(node) if node.is_backed_by(owner) => node,
                    Some(stale) => {
                        let fresh = self.build(location, archive)?;
                        self.shared.cache.replace(key, &stale, fresh)
                    }
                    None => {
                        let built = self.build(location, archive)?;
                        self.shared.cache.insert_or_get(key, built)
                    }
                }
            }
        };
        if location.credentials().is_some() {
            node.set_credentials(location.credentials().cloned());
        }
        Ok(node)
    }

    /// Whether any segment but the last is named like an archive.
    fn may_be_in_archive(&self, location: &Location) -> bool {
        if !self.shared.config.detect_archives {
            return false;
        }
        let segments = location.segments();
        let Some((_, ancestors)) = segments.split_last() else {
            return false;
        };
        ancestors
            .iter()
            .any(|segment| self.archive_format_for(segment).is_some())
    }

    /// Innermost readable archive `location` lies in, with the path of the
    /// entry inside it.
    fn enclosing_archive(
        &self,
        location: &Location,
        depth: usize,
    ) -> VfaResult<Option<(Arc<Node>, String)>> {
        let config = &self.shared.config;
        if !config.detect_archives || depth >= config.max_archive_depth {
            return Ok(None);
        }
        let segments = location.segments();
        for i in (0..segments.len().saturating_sub(1)).rev() {
            if self.archive_format_for(&segments[i]).is_none() {
                continue;
            }
            let owner = self.resolve_at_depth(&location.truncated(i + 1), depth + 1)?;
            // Directories and files that merely carry an archive extension
            // are resolved through their store.
            if matches!(owner.is_readable_archive(), Ok(true)) {
                return Ok(Some((owner, segments[i + 1..].join("/"))));
            }
        }
        Ok(None)
    }

    fn build(
        &self,
        location: &Location,
        archive: Option<(Arc<Node>, String)>,
    ) -> VfaResult<Arc<Node>> {
        if let Some((owner, entry_path)) = archive {
            if let Some(layer) = owner.archive_layer() {
                tracing::debug!("Resolved {} inside archive {}", location, owner.location());
                let entry = EntryRef::new(&owner, layer.format().clone(), entry_path);
                return Ok(self.construct(location, Backing::Entry(entry)));
            }
        }

        let backend = self.registry().get_or_err(location.scheme())?;
        tracing::debug!("Resolved {} on {}", location, backend.display_name());
        Ok(self.construct(location, Backing::Store(backend)))
    }

    fn archive_format_for(&self, name: &str) -> Option<Arc<dyn ArchiveFormat>> {
        self.registry().archive_format_for(name)
    }

    fn construct(&self, location: &Location, backing: Backing) -> Arc<Node> {
        let archive = if self.shared.config.detect_archives {
            location
                .name()
                .and_then(|name| self.archive_format_for(name))
                .map(ArchiveLayer::new)
        } else {
            None
        };
        Node::new(self.clone(), location, backing, archive)
    }

    /// Cached node for `location` if it sits on `backing`, otherwise a fresh
    /// node that takes over the cache slot. Used when the caller already
    /// knows how the location is backed.
    pub(crate) fn publish(&self, location: &Location, backing: Backing) -> Arc<Node> {
        let key = location.without_credentials();
        match self.shared.cache.get(&key) {
            Some(node) if node.has_backing(&backing) => node,
            Some(stale) => {
                let fresh = self.construct(location, backing);
                self.shared.cache.replace(key, &stale, fresh)
            }
            None => {
                let node = self.construct(location, backing);
                self.shared.cache.insert_or_get(key, node)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TransferError, VfaError};
    use crate::operation::Operation;
    use crate::testing::{map_vfs, pack, MapBackend};
    use std::io::{Read, Write};
    use std::thread;

    fn read_all(node: &Node) -> String {
        let mut out = String::new();
        node.input().unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_same_instance_per_location() {
        let (vfs, backend) = map_vfs();
        backend.add_file("dir/file.txt", b"x");
        let a = vfs.resolve("t:///dir/file.txt").unwrap();
        let b = vfs.resolve("t:///dir/./sub/../file.txt").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let parent = a.parent().unwrap().unwrap();
        assert!(Arc::ptr_eq(&parent, &vfs.resolve("t:///dir").unwrap()));
        assert_eq!(vfs.cache_stats().hit_count, 2);
    }

    #[test]
    fn test_concurrent_resolution_yields_one_instance() {
        let (vfs, _backend) = map_vfs();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let vfs = vfs.clone();
                thread::spawn(move || vfs.resolve("t:///shared/name").unwrap())
            })
            .collect();
        let nodes: Vec<Arc<Node>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(nodes.iter().all(|n| Arc::ptr_eq(n, &nodes[0])));
    }

    #[test]
    fn test_dead_nodes_purged() {
        let (vfs, _backend) = map_vfs();
        drop(vfs.resolve("t:///gone").unwrap());
        assert_eq!(vfs.cache_stats().live_entries, 0);
        assert_eq!(vfs.purge(), 1);
        assert_eq!(vfs.cache_stats().entries, 0);
    }

    #[test]
    fn test_unknown_scheme() {
        let (vfs, _backend) = map_vfs();
        assert!(matches!(vfs.resolve("smb://host/share"), Err(VfaError::NoProvider(s)) if s == "smb"));
    }

    #[test]
    fn test_credentials_updated_on_hit() {
        let (vfs, _backend) = map_vfs();
        let node = vfs.resolve("t:///x").unwrap();
        assert!(node.credentials().is_none());

        let with_login = Location::parse("t:///x")
            .unwrap()
            .with_credentials(Some(crate::location::Credentials::new("ann", None)));
        let again = vfs.resolve_location(&with_login).unwrap();
        assert!(Arc::ptr_eq(&node, &again));
        assert_eq!(node.credentials().unwrap().username, "ann");
    }

    #[test]
    fn test_gate_rejects_before_dispatch() {
        let (vfs, backend) = map_vfs();
        backend.add_file("f", b"data");
        let node = vfs.resolve("t:///f").unwrap();

        for op in Operation::ALL {
            assert_eq!(node.supports(op), node.capabilities().contains(op));
        }
        assert!(!node.supports(Operation::Rename));
        assert!(node.supports(Operation::Move));
        assert!(node.supports(Operation::Copy));

        let dest = vfs.resolve("t:///g").unwrap();
        assert!(matches!(node.rename_to(&dest), Err(VfaError::Unsupported(Operation::Rename))));
        assert!(matches!(node.append_output(), Err(VfaError::Unsupported(Operation::Append))));
        assert!(matches!(node.free_space(), Err(VfaError::Unsupported(Operation::GetFreeSpace))));
        assert!(matches!(
            node.change_date(chrono::Utc::now()),
            Err(VfaError::Unsupported(Operation::ChangeDate))
        ));
        assert_eq!(read_all(&node), "data");
    }

    #[test]
    fn test_transfer_guards() {
        let (vfs, backend) = map_vfs();
        backend.add_file("d/f", b"data");
        let file = vfs.resolve("t:///d/f").unwrap();
        let dir = vfs.resolve("t:///d").unwrap();

        assert!(matches!(file.copy_to(&file), Err(VfaError::Transfer(TransferError::SameFile(_)))));
        assert!(matches!(file.move_to(&file), Err(VfaError::Transfer(TransferError::SameFile(_)))));

        let inside = vfs.resolve("t:///d/sub").unwrap();
        assert!(matches!(
            dir.copy_to(&inside),
            Err(VfaError::Transfer(TransferError::DestinationInsideSource { .. }))
        ));

        let missing = vfs.resolve("t:///nope").unwrap();
        assert!(matches!(
            missing.copy_to(&file),
            Err(VfaError::Transfer(TransferError::SourceMissing(_)))
        ));
    }

    #[test]
    fn test_directory_copy_and_move_without_rename() {
        let (vfs, backend) = map_vfs();
        backend.add_file("src/a.txt", b"alpha");
        backend.add_file("src/nested/b.txt", b"beta");

        let src = vfs.resolve("t:///src").unwrap();
        let copy = vfs.resolve("t:///copy").unwrap();
        src.copy_to(&copy).unwrap();
        assert_eq!(read_all(&vfs.resolve("t:///copy/nested/b.txt").unwrap()), "beta");

        let moved = vfs.resolve("t:///moved").unwrap();
        src.move_to(&moved).unwrap();
        assert!(!src.exists().unwrap());
        assert_eq!(read_all(&vfs.resolve("t:///moved/a.txt").unwrap()), "alpha");
    }

    #[test]
    fn test_mkdirs_and_delete() {
        let (vfs, backend) = map_vfs();
        backend.add_file("blocker", b"");
        let deep = vfs.resolve("t:///a/b/c").unwrap();
        deep.mkdirs().unwrap();
        assert!(deep.is_directory().unwrap());
        deep.mkdirs().unwrap();

        let a = vfs.resolve("t:///a").unwrap();
        assert!(matches!(a.delete(), Err(VfaError::DirectoryNotEmpty(_))));
        assert!(matches!(a.mkdir(), Err(VfaError::AlreadyExists(_))));

        let under_file = vfs.resolve("t:///blocker/x").unwrap();
        assert!(matches!(under_file.mkdirs(), Err(VfaError::NotADirectory(_))));
    }

    #[test]
    fn test_archive_entries_are_nodes() {
        let (vfs, backend) = map_vfs();
        backend.add_file("a.pack", &pack(&["docs/readme.txt=hello", "top=1", "empty/"]));

        let archive = vfs.resolve("t:///a.pack").unwrap();
        assert!(archive.is_archive());
        assert!(archive.is_browsable().unwrap());
        assert!(!archive.is_directory().unwrap());
        let names: Vec<String> = archive.ls().unwrap().iter().map(|n| n.name().to_string()).collect();
        assert_eq!(names, ["docs", "top", "empty"]);

        let entry = vfs.resolve("t:///a.pack/docs/readme.txt").unwrap();
        assert!(entry.is_archive_entry());
        assert_eq!(entry.size().unwrap(), 5);
        assert_eq!(read_all(&entry), "hello");
        assert!(entry.parent().unwrap().unwrap().is_directory().unwrap());

        assert!(!entry.supports(Operation::Write));
        assert!(!entry.supports(Operation::Move));
        assert!(matches!(entry.output(), Err(VfaError::Unsupported(Operation::Write))));
        assert!(matches!(entry.delete(), Err(VfaError::Unsupported(Operation::Delete))));

        let absent = vfs.resolve("t:///a.pack/docs/missing").unwrap();
        assert!(!absent.exists().unwrap());
    }

    #[test]
    fn test_archive_index_follows_changes() {
        let (vfs, backend) = map_vfs();
        backend.add_file("a.pack", &pack(&["one=1"]));
        let archive = vfs.resolve("t:///a.pack").unwrap();
        assert_eq!(archive.ls().unwrap().len(), 1);

        let mut out = archive.output().unwrap();
        out.write_all(&pack(&["one=1", "two=22"])).unwrap();
        drop(out);

        assert_eq!(archive.ls().unwrap().len(), 2);
        assert_eq!(read_all(&vfs.resolve("t:///a.pack/two").unwrap()), "22");
    }

    #[test]
    fn test_signature_mismatch_is_not_browsable() {
        let (vfs, backend) = map_vfs();
        backend.add_file("fake.pack", b"not an archive");
        let fake = vfs.resolve("t:///fake.pack").unwrap();
        assert!(fake.is_archive());
        assert!(!fake.is_browsable().unwrap());

        let inner = vfs.resolve("t:///fake.pack/x").unwrap();
        assert!(!inner.is_archive_entry());
        assert!(!inner.exists().unwrap());
    }

    #[test]
    fn test_directory_named_like_archive_keeps_children() {
        let (vfs, backend) = map_vfs();
        backend.add_file("backup.pack/notes.txt", b"kept");

        let dir = vfs.resolve("t:///backup.pack").unwrap();
        assert!(dir.is_archive());
        assert!(!dir.is_readable_archive().unwrap());
        assert!(dir.is_browsable().unwrap());

        let notes = vfs.resolve("t:///backup.pack/notes.txt").unwrap();
        assert!(!notes.is_archive_entry());
        assert!(notes.exists().unwrap());
        assert_eq!(read_all(&notes), "kept");

        let listed = dir.ls().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(Arc::ptr_eq(&listed[0], &notes));
    }

    #[test]
    fn test_archive_written_after_entries_resolved() {
        let (vfs, backend) = map_vfs();
        let early = vfs.resolve("t:///late.pack/a.txt").unwrap();
        let listed_first = vfs.resolve("t:///late.pack/b.txt").unwrap();
        assert!(!early.is_archive_entry());
        assert!(!early.exists().unwrap());

        backend.add_file("late.pack", &pack(&["a.txt=alpha", "b.txt=beta"]));

        let archive = vfs.resolve("t:///late.pack").unwrap();
        let listed = archive.ls().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|n| n.is_archive_entry() && n.exists().unwrap()));
        assert!(!Arc::ptr_eq(&listed[1], &listed_first));
        assert!(Arc::ptr_eq(&vfs.resolve("t:///late.pack/b.txt").unwrap(), &listed[1]));

        let now = vfs.resolve("t:///late.pack/a.txt").unwrap();
        assert!(now.is_archive_entry());
        assert_eq!(read_all(&now), "alpha");
        assert!(Arc::ptr_eq(&now, &listed[0]));
    }

    #[test]
    fn test_checksum_through_node() {
        let (vfs, backend) = map_vfs();
        backend.add_file("fox", b"The quick brown fox jumps over the lazy dog");
        let node = vfs.resolve("t:///fox").unwrap();
        assert_eq!(node.checksum("md5").unwrap(), "9e107d9d372bb6826bd81d3542a419d6");
        assert!(matches!(node.checksum("nope"), Err(VfaError::UnknownAlgorithm(_))));
    }

    #[test]
    fn test_read_only_backend_derives_no_move() {
        let backend = Arc::new(MapBackend::with_capabilities(crate::operation::OperationSet::READ_ONLY));
        let mut registry = ProviderRegistry::new();
        registry.register(backend);
        let vfs = Vfs::new(registry);
        let node = vfs.resolve("t:///x").unwrap();
        assert!(node.supports(Operation::Copy));
        assert!(!node.supports(Operation::Move));
        assert!(node.supports(Operation::Exists));
        assert!(!node.supports(Operation::ChangePermission));
    }
}
