// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fixtures for the unit tests: a map-backed store and a line-based archive
//! format.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, SeekFrom, Write};
use std::sync::Arc;

use crate::archive::{ArchiveEntry, ArchiveFormat, Signature};
use crate::backend::{Backend, InputStream, OutputStream};
use crate::error::{VfaError, VfaResult};
use crate::location::Location;
use crate::metadata::Metadata;
use crate::operation::{Operation, OperationSet};
use crate::registry::ProviderRegistry;
use crate::stream::{BoundedWindow, MemoryRandomAccess, RandomRead};
use crate::vfs::Vfs;

type Content = Arc<Mutex<Vec<u8>>>;

#[derive(Default)]
struct Tree {
    dirs: BTreeSet<Vec<String>>,
    files: BTreeMap<Vec<String>, Content>,
}

/// Store keeping everything in maps; scheme `t`
pub struct MapBackend {
    caps: OperationSet,
    tree: Mutex<Tree>,
}

impl MapBackend {
    pub const CAPABILITIES: OperationSet = OperationSet::READ_ONLY
        .with(Operation::Write)
        .with(Operation::CreateDirectory)
        .with(Operation::Delete);

    pub fn new() -> Self {
        Self::with_capabilities(Self::CAPABILITIES)
    }

    pub fn with_capabilities(caps: OperationSet) -> Self {
        Self { caps, tree: Mutex::new(Tree::default()) }
    }

    pub fn add_dir(&self, path: &str) {
        let key = key_of(path);
        let mut tree = self.tree.lock();
        for len in 1..=key.len() {
            tree.dirs.insert(key[..len].to_vec());
        }
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        let key = key_of(path);
        if key.len() > 1 {
            self.add_dir(&key[..key.len() - 1].join("/"));
        }
        self.tree.lock().files.insert(key, Arc::new(Mutex::new(data.to_vec())));
    }

    fn content(&self, location: &Location) -> VfaResult<Content> {
        self.tree
            .lock()
            .files
            .get(location.segments())
            .cloned()
            .ok_or_else(|| VfaError::NotFound(location.to_string()))
    }
}

fn key_of(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(String::from).collect()
}

struct ContentWriter(Content);

impl Write for ContentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Backend for MapBackend {
    fn scheme(&self) -> &str {
        "t"
    }

    fn display_name(&self) -> &str {
        "Test map"
    }

    fn capabilities(&self) -> OperationSet {
        self.caps
    }

    fn metadata(&self, location: &Location) -> VfaResult<Option<Metadata>> {
        let tree = self.tree.lock();
        let key = location.segments();
        if key.is_empty() || tree.dirs.contains(key) {
            return Ok(Some(Metadata::directory()));
        }
        Ok(tree.files.get(key).map(|c| Metadata::file(c.lock().len() as u64)))
    }

    fn list(&self, location: &Location) -> VfaResult<Vec<String>> {
        let tree = self.tree.lock();
        let key = location.segments();
        let under = |k: &Vec<String>| k.len() == key.len() + 1 && k.starts_with(key);
        let mut names: Vec<String> = tree
            .dirs
            .iter()
            .chain(tree.files.keys())
            .filter(|k| under(k))
            .map(|k| k[key.len()].clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn open_read(&self, location: &Location) -> VfaResult<InputStream> {
        let data = self.content(location)?.lock().clone();
        Ok(Box::new(io::Cursor::new(data)))
    }

    fn open_random_read(&self, location: &Location) -> VfaResult<Box<dyn RandomRead>> {
        let data = self.content(location)?.lock().clone();
        Ok(Box::new(MemoryRandomAccess::new(data)))
    }

    fn open_write(&self, location: &Location, _append: bool) -> VfaResult<OutputStream> {
        let content: Content = Arc::new(Mutex::new(Vec::new()));
        self.tree
            .lock()
            .files
            .insert(location.segments().to_vec(), content.clone());
        Ok(Box::new(ContentWriter(content)))
    }

    fn create_directory(&self, location: &Location) -> VfaResult<()> {
        self.tree.lock().dirs.insert(location.segments().to_vec());
        Ok(())
    }

    fn delete(&self, location: &Location) -> VfaResult<()> {
        let mut tree = self.tree.lock();
        let key = location.segments();
        if tree.files.remove(key).is_none() && !tree.dirs.remove(key) {
            return Err(VfaError::NotFound(location.to_string()));
        }
        Ok(())
    }
}

/// Archive of `path=data` lines after a `PACK` header line; paths ending
/// in `/` are directories.
pub struct PackFormat;

impl ArchiveFormat for PackFormat {
    fn name(&self) -> &str {
        "pack"
    }

    fn extensions(&self) -> &[&str] {
        &["pack"]
    }

    fn signature(&self) -> Option<Signature> {
        Some(Signature { offset: 0, magic: b"PACK\n" })
    }

    fn read_index(&self, archive: &mut dyn RandomRead) -> VfaResult<Vec<ArchiveEntry>> {
        let mut text = String::new();
        archive.seek(SeekFrom::Start(0))?;
        archive.read_to_string(&mut text)?;

        let mut entries = Vec::new();
        let mut offset = 0u64;
        for line in text.split_inclusive('\n').skip(1) {
            let start = offset + 5;
            offset += line.len() as u64;
            let line = line.trim_end_matches('\n');
            if let Some(dir) = line.strip_suffix('/') {
                entries.push(ArchiveEntry::directory(dir));
                continue;
            }
            let (path, data) = line
                .split_once('=')
                .ok_or_else(|| VfaError::Archive(format!("bad pack line {line:?}")))?;
            entries.push(ArchiveEntry::file(path, start + path.len() as u64 + 1, data.len() as u64));
        }
        Ok(entries)
    }

    fn open_entry(&self, archive: Box<dyn RandomRead>, entry: &ArchiveEntry) -> VfaResult<InputStream> {
        Ok(Box::new(BoundedWindow::new(archive, entry.offset, entry.size)?))
    }
}

/// Build the text of a pack archive.
pub fn pack(lines: &[&str]) -> Vec<u8> {
    let mut out = String::from("PACK\n");
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.into_bytes()
}

/// Vfs over a fresh [`MapBackend`] with the pack format registered.
pub fn map_vfs() -> (Vfs, Arc<MapBackend>) {
    let backend = Arc::new(MapBackend::new());
    let mut registry = ProviderRegistry::new();
    registry.register(backend.clone());
    registry.register_archive_format(Arc::new(PackFormat));
    (Vfs::new(registry), backend)
}
