// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive subsystem
//!
//! An [`ArchiveFormat`] turns the bytes of an archive into an index of
//! entries and opens individual entries for reading. Nodes whose name
//! matches a registered format carry an [`ArchiveLayer`], which builds that
//! index lazily and rebuilds it whenever the archive's size or modification
//! time changes. Entries become child nodes of the archive node.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use crate::backend::InputStream;
use crate::error::{VfaError, VfaResult};
use crate::metadata::Metadata;
use crate::node::Node;
use crate::operation::OperationSet;
use crate::permissions::{FilePermissions, PermissionMask};
use crate::stream::{MemoryRandomAccess, RandomRead};

/// Magic bytes identifying a format
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub offset: u64,
    pub magic: &'static [u8],
}

/// One entry of an archive index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path relative to the archive root, `/`-separated
    pub path: String,
    /// Offset of the entry's data within the archive
    pub offset: u64,
    pub size: u64,
    pub compressed_size: u64,
    pub is_directory: bool,
    pub modified: Option<DateTime<Utc>>,
    pub permissions: Option<u16>,
}

impl ArchiveEntry {
    pub fn file(path: impl Into<String>, offset: u64, size: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            size,
            compressed_size: size,
            is_directory: false,
            modified: None,
            permissions: None,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self { is_directory: true, ..Self::file(path, 0, 0) }
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn to_metadata(&self) -> Metadata {
        let mut meta = if self.is_directory {
            Metadata::directory()
        } else {
            Metadata::file(self.size)
        };
        meta.modified = self.modified;
        meta.permissions = self
            .permissions
            .map(|mode| FilePermissions::new(mode, PermissionMask::ALL));
        meta
    }
}

/// Pluggable archive format
pub trait ArchiveFormat: Send + Sync {
    fn name(&self) -> &str;

    /// Lower-case file name extensions, without the leading dot.
    fn extensions(&self) -> &[&str];

    fn signature(&self) -> Option<Signature> {
        None
    }

    /// Native operations on entries of this format.
    fn capabilities(&self) -> OperationSet {
        OperationSet::READ_ONLY
    }

    /// Scan the archive and list its entries, in archive order.
    fn read_index(&self, archive: &mut dyn RandomRead) -> VfaResult<Vec<ArchiveEntry>>;

    /// Stream the decoded content of `entry`.
    fn open_entry(&self, archive: Box<dyn RandomRead>, entry: &ArchiveEntry)
        -> VfaResult<InputStream>;

    /// Random access to the decoded content of `entry`. The default buffers
    /// the entry in memory.
    fn open_random_entry(
        &self,
        archive: Box<dyn RandomRead>,
        entry: &ArchiveEntry,
    ) -> VfaResult<Box<dyn RandomRead>> {
        let mut stream = self.open_entry(archive, entry)?;
        Ok(Box::new(MemoryRandomAccess::from_reader(&mut stream)?))
    }

    /// Length of the longest extension of this format matching `name`.
    fn match_len(&self, name: &str) -> Option<usize> {
        let lower = name.to_lowercase();
        self.extensions()
            .iter()
            .filter(|ext| {
                lower.len() > ext.len() + 1
                    && lower.ends_with(*ext)
                    && lower.as_bytes()[lower.len() - ext.len() - 1] == b'.'
            })
            .map(|ext| ext.len())
            .max()
    }
}

/// What an index was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStamp {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

fn normalize_entry_path(raw: &str) -> Option<String> {
    let mut parts = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            // Entries escaping the archive root are dropped.
            ".." => return None,
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Immutable snapshot of an archive's entries
#[derive(Debug)]
pub struct ArchiveIndex {
    stamp: IndexStamp,
    entries: HashMap<String, ArchiveEntry>,
    children: HashMap<String, Vec<String>>,
}

impl ArchiveIndex {
    /// Build from raw entries; missing parent directories are synthesized
    /// and later duplicates replace earlier ones.
    pub fn build(raw: Vec<ArchiveEntry>, stamp: IndexStamp) -> Self {
        let mut index = Self {
            stamp,
            entries: HashMap::new(),
            children: HashMap::new(),
        };
        index.children.insert(String::new(), Vec::new());
        let mut linked: HashSet<String> = HashSet::new();

        for mut entry in raw {
            let Some(path) = normalize_entry_path(&entry.path) else {
                continue;
            };
            entry.path = path.clone();

            // Ancestors first, root-most first.
            let mut ancestors = Vec::new();
            let mut cur = parent_of(&path);
            while !cur.is_empty() {
                ancestors.push(cur.to_string());
                cur = parent_of(cur);
            }
            for dir in ancestors.into_iter().rev() {
                match index.entries.get(&dir).map(|existing| existing.is_directory) {
                    Some(true) => {}
                    Some(false) => index.promote(&dir),
                    None => index.insert(ArchiveEntry::directory(dir.clone()), &mut linked),
                }
            }

            index.insert(entry, &mut linked);
        }
        index
    }

    /// Turn the file entry at `path` into a directory because other entries
    /// live below it.
    fn promote(&mut self, path: &str) {
        if let Some(entry) = self.entries.get_mut(path) {
            tracing::debug!("Archive entry {} has children; treating it as a directory", path);
            entry.is_directory = true;
            entry.offset = 0;
            entry.size = 0;
            entry.compressed_size = 0;
        }
        self.children.entry(path.to_string()).or_default();
    }

    fn insert(&mut self, entry: ArchiveEntry, linked: &mut HashSet<String>) {
        let path = entry.path.clone();
        // A directory that already holds entries stays one.
        if !entry.is_directory && self.children.get(&path).is_some_and(|c| !c.is_empty()) {
            return;
        }
        if entry.is_directory {
            self.children.entry(path.clone()).or_default();
        }
        if linked.insert(path.clone()) {
            self.children
                .entry(parent_of(&path).to_string())
                .or_default()
                .push(entry.name().to_string());
        }
        self.entries.insert(path, entry);
    }

    pub fn stamp(&self) -> IndexStamp {
        self.stamp
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries.get(path)
    }

    /// Names of the entries directly under `dir` (`""` is the root), or
    /// `None` if `dir` is not a directory of this archive.
    pub fn children(&self, dir: &str) -> Option<&[String]> {
        self.children.get(dir).map(Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.values()
    }
}

/// Archive decorator carried by a node whose content is an archive
pub struct ArchiveLayer {
    format: Arc<dyn ArchiveFormat>,
    index: RwLock<Option<Arc<ArchiveIndex>>>,
}

impl ArchiveLayer {
    pub fn new(format: Arc<dyn ArchiveFormat>) -> Self {
        Self { format, index: RwLock::new(None) }
    }

    pub fn format(&self) -> &Arc<dyn ArchiveFormat> {
        &self.format
    }

    /// Index as last built, without checking for staleness.
    pub fn cached(&self) -> Option<Arc<ArchiveIndex>> {
        self.index.read().clone()
    }

    pub fn invalidate(&self) {
        *self.index.write() = None;
    }

    /// Current index of `archive`, built on first use and rebuilt when the
    /// archive's size or modification time moved.
    pub fn index(&self, archive: &Node) -> VfaResult<Arc<ArchiveIndex>> {
        let meta = archive
            .metadata()?
            .ok_or_else(|| VfaError::NotFound(archive.location().to_string()))?;
        if meta.is_directory() {
            return Err(VfaError::NotAFile(archive.location().to_string()));
        }
        let stamp = IndexStamp { size: meta.size, modified: meta.modified };

        if let Some(index) = self.index.read().as_ref() {
            if index.stamp == stamp {
                return Ok(index.clone());
            }
        }

        tracing::debug!("Building {} index for {}", self.format.name(), archive.location());
        let mut stream = archive.content_random_access()?;
        if !self.signature_in(&mut *stream)? {
            return Err(VfaError::Archive(format!(
                "{} is not a {} archive",
                archive.location(),
                self.format.name()
            )));
        }
        stream.seek(SeekFrom::Start(0))?;
        let entries = self.format.read_index(&mut *stream)?;
        let index = Arc::new(ArchiveIndex::build(entries, stamp));
        tracing::debug!("Indexed {} entries in {}", index.len(), archive.location());

        // Concurrent builders race here; the last complete index wins.
        *self.index.write() = Some(index.clone());
        Ok(index)
    }

    pub fn entry(&self, archive: &Node, path: &str) -> VfaResult<Option<ArchiveEntry>> {
        Ok(self.index(archive)?.entry(path).cloned())
    }

    pub fn entries(&self, archive: &Node) -> VfaResult<Vec<ArchiveEntry>> {
        Ok(self.index(archive)?.entries().cloned().collect())
    }

    pub fn children(&self, archive: &Node, dir: &str) -> VfaResult<Option<Vec<String>>> {
        Ok(self.index(archive)?.children(dir).map(<[String]>::to_vec))
    }

    /// Whether the content of `archive` starts with this format's magic.
    /// Formats without a signature always match.
    pub fn signature_matches(&self, archive: &Node) -> VfaResult<bool> {
        if self.format.signature().is_none() {
            return Ok(true);
        }
        let mut stream = archive.content_random_access()?;
        self.signature_in(&mut *stream)
    }

    fn signature_in(&self, stream: &mut dyn RandomRead) -> VfaResult<bool> {
        let Some(sig) = self.format.signature() else {
            return Ok(true);
        };
        let mut magic = vec![0u8; sig.magic.len()];
        stream.seek(SeekFrom::Start(sig.offset))?;
        match stream.read_fully(&mut magic) {
            Ok(()) => Ok(magic == sig.magic),
            Err(VfaError::EndOfInput) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> IndexStamp {
        IndexStamp { size: 1, modified: None }
    }

    #[test]
    fn test_implicit_directories_synthesized() {
        let index = ArchiveIndex::build(
            vec![ArchiveEntry::file("a/b/c.txt", 512, 10), ArchiveEntry::file("top.txt", 1024, 3)],
            stamp(),
        );
        assert!(index.entry("a").unwrap().is_directory);
        assert!(index.entry("a/b").unwrap().is_directory);
        assert_eq!(index.children("").unwrap(), &["a".to_string(), "top.txt".to_string()]);
        assert_eq!(index.children("a/b").unwrap(), &["c.txt".to_string()]);
        assert!(index.children("top.txt").is_none());
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_explicit_directory_after_implicit_not_duplicated() {
        let index = ArchiveIndex::build(
            vec![ArchiveEntry::file("d/x", 0, 1), ArchiveEntry::directory("d/")],
            stamp(),
        );
        assert_eq!(index.children("").unwrap(), &["d".to_string()]);
        assert_eq!(index.children("d").unwrap(), &["x".to_string()]);
    }

    #[test]
    fn test_file_with_children_becomes_directory() {
        let index = ArchiveIndex::build(
            vec![
                ArchiveEntry::file("a", 512, 4),
                ArchiveEntry::file("a/b", 1024, 2),
                ArchiveEntry::file("a", 2048, 9),
            ],
            stamp(),
        );
        let a = index.entry("a").unwrap();
        assert!(a.is_directory);
        assert_eq!(a.size, 0);
        assert_eq!(index.children("").unwrap(), &["a".to_string()]);
        assert_eq!(index.children("a").unwrap(), &["b".to_string()]);
        assert!(!index.entry("a/b").unwrap().is_directory);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_paths_normalized_and_escapes_dropped() {
        let index = ArchiveIndex::build(
            vec![
                ArchiveEntry::file("./docs//readme", 0, 1),
                ArchiveEntry::file("../evil", 0, 1),
                ArchiveEntry::file("/abs", 0, 1),
            ],
            stamp(),
        );
        assert!(index.entry("docs/readme").is_some());
        assert!(index.entry("abs").is_some());
        assert!(index.entries().all(|e| !e.path.contains("..")));
    }

    #[test]
    fn test_entry_metadata() {
        let mut entry = ArchiveEntry::file("x.bin", 0, 42);
        entry.permissions = Some(0o640);
        let meta = entry.to_metadata();
        assert_eq!(meta.size, 42);
        assert!(meta.is_file());
        assert_eq!(meta.permissions.unwrap().to_mode(), 0o640);
        assert_eq!(ArchiveEntry::directory("d").to_metadata().display_size(), 0);
    }
}
