// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory backend
//!
//! A volatile tree served under the `mem` scheme. Content lives in shared
//! buffers so streams opened on a file see writes made through other
//! streams once they are flushed.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use vfa_core::backend::{Backend, InputStream, OutputStream};
use vfa_core::stream::{MemoryRandomAccess, RandomRead, RandomWrite};
use vfa_core::{
    FilePermissions, Location, Metadata, Operation, OperationSet, PermissionMask, VfaError,
    VfaResult,
};

pub const MEMORY_SCHEME: &str = "mem";

type Buffer = Arc<Mutex<Vec<u8>>>;

enum Content {
    Directory,
    File(Buffer),
}

struct MemEntry {
    content: Content,
    modified: DateTime<Utc>,
    mode: u16,
}

impl MemEntry {
    fn directory() -> Self {
        Self { content: Content::Directory, modified: Utc::now(), mode: 0o755 }
    }

    fn file(buffer: Buffer) -> Self {
        Self { content: Content::File(buffer), modified: Utc::now(), mode: 0o644 }
    }

    fn is_directory(&self) -> bool {
        matches!(self.content, Content::Directory)
    }
}

type Key = Vec<String>;

/// Volatile in-memory store
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<Key, MemEntry>>,
}

impl MemoryBackend {
    pub const CAPABILITIES: OperationSet = OperationSet::READ_ONLY
        .with(Operation::Write)
        .with(Operation::Append)
        .with(Operation::RandomWrite)
        .with(Operation::CreateFile)
        .with(Operation::CreateDirectory)
        .with(Operation::Delete)
        .with(Operation::Rename)
        .with(Operation::ChangePermission)
        .with(Operation::ChangeDate);

    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(Vec::new(), MemEntry::directory());
        Self { entries: RwLock::new(entries) }
    }

    fn key(location: &Location) -> Key {
        location.segments().to_vec()
    }

    fn buffer(&self, location: &Location) -> VfaResult<Buffer> {
        match self.entries.read().get(location.segments()) {
            Some(MemEntry { content: Content::File(buffer), .. }) => Ok(buffer.clone()),
            Some(_) => Err(VfaError::NotAFile(location.to_string())),
            None => Err(VfaError::NotFound(location.to_string())),
        }
    }

    /// The parent of `key` must be an existing directory.
    fn check_parent(entries: &BTreeMap<Key, MemEntry>, key: &[String], location: &Location) -> VfaResult<()> {
        let Some((_, parent)) = key.split_last() else {
            return Ok(());
        };
        match entries.get(parent) {
            Some(entry) if entry.is_directory() => Ok(()),
            Some(_) => Err(VfaError::NotADirectory(location.to_string())),
            None => Err(VfaError::NotFound(location.to_string())),
        }
    }

    /// Buffer for writing at `location`, creating the file if needed.
    fn writable(&self, location: &Location, truncate: bool) -> VfaResult<Buffer> {
        let key = Self::key(location);
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&key) {
            let Content::File(buffer) = &entry.content else {
                return Err(VfaError::NotAFile(location.to_string()));
            };
            if truncate {
                buffer.lock().clear();
            }
            entry.modified = Utc::now();
            return Ok(buffer.clone());
        }
        Self::check_parent(&entries, &key, location)?;
        let buffer: Buffer = Arc::default();
        entries.insert(key, MemEntry::file(buffer.clone()));
        Ok(buffer)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential writer appending to a shared buffer
struct MemOutput(Buffer);

impl Write for MemOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Seekable read/write view of a shared buffer
struct MemRandomFile {
    buffer: Buffer,
    pos: u64,
}

fn out_of_range(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{what} beyond addressable memory"))
}

/// Grow `data` to `len` bytes, failing instead of aborting when the
/// allocation cannot be made.
fn grow(data: &mut Vec<u8>, len: usize) -> io::Result<()> {
    if len > data.len() {
        data.try_reserve(len - data.len())
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        data.resize(len, 0);
    }
    Ok(())
}

impl Read for MemRandomFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.buffer.lock();
        let start = usize::try_from(self.pos).map_or(data.len(), |pos| pos.min(data.len()));
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemRandomFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let start = usize::try_from(self.pos).map_err(|_| out_of_range("write position"))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| out_of_range("write end"))?;
        let mut data = self.buffer.lock();
        grow(&mut data, end)?;
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemRandomFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.buffer.lock().len() as i128;
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::End(delta) => len + delta as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = u64::try_from(target).map_err(|_| out_of_range("seek target"))?;
        Ok(self.pos)
    }
}

impl RandomWrite for MemRandomFile {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.buffer.lock().len() as u64)
    }

    fn set_length(&mut self, len: u64) -> io::Result<()> {
        let new_len = usize::try_from(len).map_err(|_| out_of_range("length"))?;
        let mut data = self.buffer.lock();
        grow(&mut data, new_len)?;
        data.truncate(new_len);
        self.pos = self.pos.min(len);
        Ok(())
    }
}

impl Backend for MemoryBackend {
    fn scheme(&self) -> &str {
        MEMORY_SCHEME
    }

    fn display_name(&self) -> &str {
        "Memory"
    }

    fn capabilities(&self) -> OperationSet {
        Self::CAPABILITIES
    }

    fn readable_permissions(&self) -> PermissionMask {
        PermissionMask::ALL
    }

    fn changeable_permissions(&self) -> PermissionMask {
        PermissionMask::ALL
    }

    fn metadata(&self, location: &Location) -> VfaResult<Option<Metadata>> {
        let entries = self.entries.read();
        Ok(entries.get(location.segments()).map(|entry| {
            let meta = match &entry.content {
                Content::Directory => Metadata::directory(),
                Content::File(buffer) => Metadata::file(buffer.lock().len() as u64),
            };
            meta.with_modified(entry.modified)
                .with_permissions(FilePermissions::new(entry.mode, PermissionMask::ALL))
        }))
    }

    fn list(&self, location: &Location) -> VfaResult<Vec<String>> {
        let entries = self.entries.read();
        let key = location.segments();
        match entries.get(key) {
            Some(entry) if entry.is_directory() => {}
            Some(_) => return Err(VfaError::NotADirectory(location.to_string())),
            None => return Err(VfaError::NotFound(location.to_string())),
        }
        Ok(entries
            .range(key.to_vec()..)
            .skip(1)
            .take_while(|(k, _)| k.starts_with(key))
            .filter(|(k, _)| k.len() == key.len() + 1)
            .map(|(k, _)| k[key.len()].clone())
            .collect())
    }

    fn open_read(&self, location: &Location) -> VfaResult<InputStream> {
        let data = self.buffer(location)?.lock().clone();
        Ok(Box::new(io::Cursor::new(data)))
    }

    fn open_random_read(&self, location: &Location) -> VfaResult<Box<dyn RandomRead>> {
        let data = self.buffer(location)?.lock().clone();
        Ok(Box::new(MemoryRandomAccess::new(data)))
    }

    fn open_write(&self, location: &Location, append: bool) -> VfaResult<OutputStream> {
        Ok(Box::new(MemOutput(self.writable(location, !append)?)))
    }

    fn open_random_write(&self, location: &Location) -> VfaResult<Box<dyn RandomWrite>> {
        Ok(Box::new(MemRandomFile { buffer: self.writable(location, false)?, pos: 0 }))
    }

    fn create_file(&self, location: &Location) -> VfaResult<()> {
        let key = Self::key(location);
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(VfaError::AlreadyExists(location.to_string()));
        }
        Self::check_parent(&entries, &key, location)?;
        entries.insert(key, MemEntry::file(Arc::default()));
        Ok(())
    }

    fn create_directory(&self, location: &Location) -> VfaResult<()> {
        let key = Self::key(location);
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(VfaError::AlreadyExists(location.to_string()));
        }
        Self::check_parent(&entries, &key, location)?;
        entries.insert(key, MemEntry::directory());
        Ok(())
    }

    fn delete(&self, location: &Location) -> VfaResult<()> {
        let key = Self::key(location);
        let mut entries = self.entries.write();
        let is_directory = match entries.get(&key) {
            Some(entry) => entry.is_directory(),
            None => return Err(VfaError::NotFound(location.to_string())),
        };
        if key.is_empty() {
            return Err(VfaError::PermissionDenied(location.to_string()));
        }
        if is_directory && entries.range(key.clone()..).nth(1).is_some_and(|(k, _)| k.starts_with(&key)) {
            return Err(VfaError::DirectoryNotEmpty(location.to_string()));
        }
        entries.remove(&key);
        Ok(())
    }

    fn rename(&self, from: &Location, to: &Location) -> VfaResult<()> {
        let source = Self::key(from);
        let target = Self::key(to);
        let mut entries = self.entries.write();
        if !entries.contains_key(&source) {
            return Err(VfaError::NotFound(from.to_string()));
        }
        if target == source {
            return Ok(());
        }
        if source.is_empty() || target.starts_with(&source) {
            return Err(VfaError::PermissionDenied(to.to_string()));
        }
        Self::check_parent(&entries, &target, to)?;
        if let Some(existing) = entries.get(&target) {
            let has_children = entries
                .range(target.clone()..)
                .nth(1)
                .is_some_and(|(k, _)| k.starts_with(&target));
            if existing.is_directory() && has_children {
                return Err(VfaError::DirectoryNotEmpty(to.to_string()));
            }
            entries.remove(&target);
        }

        let moved: Vec<Key> = entries
            .range(source.clone()..)
            .take_while(|(k, _)| k.starts_with(&source))
            .map(|(k, _)| k.clone())
            .collect();
        for key in moved {
            if let Some(entry) = entries.remove(&key) {
                let mut renamed = target.clone();
                renamed.extend_from_slice(&key[source.len()..]);
                entries.insert(renamed, entry);
            }
        }
        Ok(())
    }

    fn set_permissions(&self, location: &Location, mode: u16) -> VfaResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(location.segments())
            .ok_or_else(|| VfaError::NotFound(location.to_string()))?;
        entry.mode = mode & 0o777;
        Ok(())
    }

    fn set_modified(&self, location: &Location, modified: DateTime<Utc>) -> VfaResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(location.segments())
            .ok_or_else(|| VfaError::NotFound(location.to_string()))?;
        entry.modified = modified;
        Ok(())
    }
}
