// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local filesystem backend

use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use vfa_core::backend::{Backend, InputStream, OutputStream};
use vfa_core::stream::{close_quietly, RandomRead, RandomWrite};
use vfa_core::{
    EntryKind, Location, Metadata, Operation, OperationSet, PermissionMask, PlatformBridge,
    SpaceInfo, VfaError, VfaResult, LOCAL_SCHEME,
};

use crate::platform::native_platform;

/// Local filesystem backend, serving the `file` scheme
pub struct LocalBackend {
    platform: Arc<dyn PlatformBridge>,
    capabilities: OperationSet,
}

impl LocalBackend {
    /// Operations available on every platform.
    pub const BASE_CAPABILITIES: OperationSet = OperationSet::READ_ONLY
        .with(Operation::Write)
        .with(Operation::Append)
        .with(Operation::RandomWrite)
        .with(Operation::CreateFile)
        .with(Operation::CreateDirectory)
        .with(Operation::Delete)
        .with(Operation::Rename)
        .with(Operation::CopyRemote)
        .with(Operation::ChangeDate);

    pub fn new() -> Self {
        Self::with_platform(native_platform())
    }

    pub fn with_platform(platform: Arc<dyn PlatformBridge>) -> Self {
        let mut capabilities = Self::BASE_CAPABILITIES;
        if !platform.changeable_permissions().is_empty() {
            capabilities = capabilities.with(Operation::ChangePermission);
        }
        if platform.supports_space_queries() {
            capabilities = capabilities
                .with(Operation::GetFreeSpace)
                .with(Operation::GetTotalSpace);
        }
        tracing::debug!("Local backend on {} platform: {:?}", platform.name(), capabilities);
        Self { platform, capabilities }
    }

    pub fn platform(&self) -> &dyn PlatformBridge {
        &*self.platform
    }

    fn real_path(location: &Location) -> PathBuf {
        location.native_path()
    }

    fn open_file(&self, location: &Location) -> VfaResult<File> {
        let file = File::open(Self::real_path(location)).map_err(|e| map_io(e, location))?;
        if file.metadata().map_err(|e| map_io(e, location))?.is_dir() {
            return Err(VfaError::NotAFile(location.to_string()));
        }
        Ok(file)
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn map_io(err: io::Error, location: &Location) -> VfaError {
    #[cfg(unix)]
    {
        match err.raw_os_error() {
            Some(libc::ENOTEMPTY) => return VfaError::DirectoryNotEmpty(location.to_string()),
            Some(libc::ENOTDIR) => return VfaError::NotADirectory(location.to_string()),
            Some(libc::EISDIR) => return VfaError::NotAFile(location.to_string()),
            _ => {}
        }
    }
    VfaError::from_io(err, location.to_string())
}

fn is_absent(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(libc::ENOTDIR) {
            return true;
        }
    }
    err.kind() == io::ErrorKind::NotFound
}

/// Buffered file writer that flushes when dropped
struct FileOutput {
    inner: BufWriter<File>,
    location: Location,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        close_quietly(&mut self.inner, &self.location);
    }
}

impl Backend for LocalBackend {
    fn scheme(&self) -> &str {
        LOCAL_SCHEME
    }

    fn display_name(&self) -> &str {
        "Local Filesystem"
    }

    fn capabilities(&self) -> OperationSet {
        self.capabilities
    }

    fn readable_permissions(&self) -> PermissionMask {
        self.platform.readable_permissions()
    }

    fn changeable_permissions(&self) -> PermissionMask {
        self.platform.changeable_permissions()
    }

    fn metadata(&self, location: &Location) -> VfaResult<Option<Metadata>> {
        let real = Self::real_path(location);
        let meta = match fs::metadata(&real) {
            Ok(meta) => meta,
            Err(e) if is_absent(&e) => match fs::symlink_metadata(&real) {
                // Dangling link: the link itself exists.
                Ok(link) => link,
                Err(_) => return Ok(None),
            },
            Err(e) => return Err(map_io(e, location)),
        };

        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else if meta.is_file() {
            EntryKind::File
        } else if meta.file_type().is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::Unknown
        };

        let (owner, group) = self.platform.owner(&meta);
        Ok(Some(Metadata {
            kind,
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            permissions: Some(self.platform.permissions(&meta)),
            owner,
            group,
        }))
    }

    fn list(&self, location: &Location) -> VfaResult<Vec<String>> {
        let real = Self::real_path(location);
        let mut names = Vec::new();
        for entry in fs::read_dir(&real).map_err(|e| map_io(e, location))? {
            let entry = entry.map_err(|e| map_io(e, location))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn open_read(&self, location: &Location) -> VfaResult<InputStream> {
        Ok(Box::new(self.open_file(location)?))
    }

    fn open_random_read(&self, location: &Location) -> VfaResult<Box<dyn RandomRead>> {
        Ok(Box::new(self.open_file(location)?))
    }

    fn open_write(&self, location: &Location, append: bool) -> VfaResult<OutputStream> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(Self::real_path(location))
            .map_err(|e| map_io(e, location))?;
        Ok(Box::new(FileOutput {
            inner: BufWriter::new(file),
            location: location.without_credentials(),
        }))
    }

    fn open_random_write(&self, location: &Location) -> VfaResult<Box<dyn RandomWrite>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(Self::real_path(location))
            .map_err(|e| map_io(e, location))?;
        Ok(Box::new(file))
    }

    fn create_file(&self, location: &Location) -> VfaResult<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(Self::real_path(location))
            .map_err(|e| map_io(e, location))?;
        Ok(())
    }

    fn create_directory(&self, location: &Location) -> VfaResult<()> {
        fs::create_dir(Self::real_path(location)).map_err(|e| map_io(e, location))
    }

    fn delete(&self, location: &Location) -> VfaResult<()> {
        let real = Self::real_path(location);
        let meta = fs::symlink_metadata(&real).map_err(|e| map_io(e, location))?;
        if meta.is_dir() {
            fs::remove_dir(&real)
        } else {
            fs::remove_file(&real)
        }
        .map_err(|e| map_io(e, location))
    }

    fn rename(&self, from: &Location, to: &Location) -> VfaResult<()> {
        fs::rename(Self::real_path(from), Self::real_path(to)).map_err(|e| map_io(e, from))
    }

    fn copy_remote(&self, from: &Location, to: &Location) -> VfaResult<()> {
        fs::copy(Self::real_path(from), Self::real_path(to)).map_err(|e| map_io(e, from))?;
        Ok(())
    }

    fn set_permissions(&self, location: &Location, mode: u16) -> VfaResult<()> {
        self.platform.set_permissions(&Self::real_path(location), mode)
    }

    fn set_modified(&self, location: &Location, modified: DateTime<Utc>) -> VfaResult<()> {
        let file = File::open(Self::real_path(location)).map_err(|e| map_io(e, location))?;
        file.set_modified(SystemTime::from(modified))
            .map_err(|e| map_io(e, location))
    }

    fn space(&self, location: &Location) -> VfaResult<SpaceInfo> {
        self.platform.volume_space(&Self::real_path(location))
    }
}
