// SPDX-License-Identifier: AGPL-3.0-or-later
//! Node abstraction
//!
//! A [`Node`] is the handle for one location in some store. It is either
//! backed directly by a [`Backend`] or is an entry inside an archive, and in
//! both cases may itself carry an [`ArchiveLayer`] when its content is a
//! recognized archive.
//!
//! Every public operation goes through [`Node::supports`] first and fails
//! with [`VfaError::Unsupported`] before touching the store when the
//! operation is not available. Attributes are fetched on every call; a node
//! caches nothing about the file it points to.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::archive::{ArchiveEntry, ArchiveFormat, ArchiveLayer};
use crate::backend::{Backend, InputStream, OutputStream};
use crate::error::{TransferError, VfaError, VfaResult};
use crate::location::{Credentials, Location};
use crate::metadata::Metadata;
use crate::operation::{Operation, OperationSet};
use crate::permissions::{FilePermissions, PermissionAccess, PermissionKind, PermissionMask};
use crate::stream::{copy_stream, ChecksumReader, MemoryRandomAccess, RandomRead, RandomWrite};
use crate::vfs::Vfs;

/// What a node reads from and writes to
pub(crate) enum Backing {
    Store(Arc<dyn Backend>),
    Entry(EntryRef),
}

/// Position of a node inside an archive
pub(crate) struct EntryRef {
    owner_location: Location,
    owner: Mutex<Weak<Node>>,
    format: Arc<dyn ArchiveFormat>,
    path: String,
}

impl EntryRef {
    pub(crate) fn new(owner: &Arc<Node>, format: Arc<dyn ArchiveFormat>, path: String) -> Self {
        Self {
            owner_location: owner.location_with_credentials(),
            owner: Mutex::new(Arc::downgrade(owner)),
            format,
            path,
        }
    }

    /// The archive node, re-resolved through the cache if it was dropped.
    fn owner(&self, vfs: &Vfs) -> VfaResult<Arc<Node>> {
        if let Some(owner) = self.owner.lock().upgrade() {
            return Ok(owner);
        }
        let owner = vfs.resolve_location(&self.owner_location)?;
        *self.owner.lock() = Arc::downgrade(&owner);
        Ok(owner)
    }

    fn child_path(&self, name: &str) -> String {
        format!("{}/{}", self.path, name)
    }

    fn is_owned_by(&self, archive: &Arc<Node>) -> bool {
        match self.owner.lock().upgrade() {
            Some(owner) => Arc::ptr_eq(&owner, archive),
            None => self.owner_location.without_credentials() == *archive.location(),
        }
    }

    fn same_position(&self, other: &EntryRef) -> bool {
        self.path == other.path
            && self.owner_location.without_credentials() == other.owner_location.without_credentials()
    }
}

/// Handle for one location
pub struct Node {
    location: Location,
    credentials: RwLock<Option<Credentials>>,
    backing: Backing,
    archive: Option<ArchiveLayer>,
    vfs: Vfs,
    me: Weak<Node>,
}

impl Node {
    pub(crate) fn new(
        vfs: Vfs,
        location: &Location,
        backing: Backing,
        archive: Option<ArchiveLayer>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            location: location.without_credentials(),
            credentials: RwLock::new(location.credentials().cloned()),
            backing,
            archive,
            vfs,
            me: me.clone(),
        })
    }

    // ---------------------------------------------------------------
    // Identity
    // ---------------------------------------------------------------

    /// Canonical location, without credentials.
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn location_with_credentials(&self) -> Location {
        self.location.clone().with_credentials(self.credentials())
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.read().clone()
    }

    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        *self.credentials.write() = credentials;
    }

    /// Last path segment; empty at the root.
    pub fn name(&self) -> &str {
        self.location.name().unwrap_or("")
    }

    pub fn extension(&self) -> Option<String> {
        self.location.extension()
    }

    /// Text that resolves back to this node: a native path for local
    /// nodes, a URL otherwise.
    pub fn canonical_path(&self, trailing_separator: bool) -> String {
        if self.location.is_local() {
            let mut path = self.location.native_path().to_string_lossy().into_owned();
            if trailing_separator && !self.location.is_root() {
                path.push(std::path::MAIN_SEPARATOR);
            }
            path
        } else {
            self.location.to_string_with(false, trailing_separator)
        }
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    /// Parent node, or `None` at the root.
    pub fn parent(&self) -> VfaResult<Option<Arc<Node>>> {
        match self.location_with_credentials().parent() {
            Some(parent) => self.vfs.resolve_location(&parent).map(Some),
            None => Ok(None),
        }
    }

    /// Node for the direct child `name`, which need not exist.
    pub fn child(&self, name: &str) -> VfaResult<Arc<Node>> {
        let location = self.location_with_credentials().resolve_direct_child(name)?;
        self.vfs.resolve_location(&location)
    }

    fn arc(&self) -> VfaResult<Arc<Node>> {
        self.me.upgrade().ok_or_else(|| self.not_found())
    }

    fn not_found(&self) -> VfaError {
        VfaError::NotFound(self.location.to_string())
    }

    pub fn is_archive(&self) -> bool {
        self.archive.is_some()
    }

    pub fn is_archive_entry(&self) -> bool {
        matches!(self.backing, Backing::Entry(_))
    }

    pub fn archive_layer(&self) -> Option<&ArchiveLayer> {
        self.archive.as_ref()
    }

    /// Whether this node is inside `archive`, or directly on a store when
    /// `archive` is `None`.
    pub(crate) fn is_backed_by(&self, archive: Option<&Arc<Node>>) -> bool {
        match (&self.backing, archive) {
            (Backing::Store(_), None) => true,
            (Backing::Entry(entry), Some(archive)) => entry.is_owned_by(archive),
            _ => false,
        }
    }

    pub(crate) fn has_backing(&self, backing: &Backing) -> bool {
        match (&self.backing, backing) {
            (Backing::Store(a), Backing::Store(b)) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            (Backing::Entry(a), Backing::Entry(b)) => a.same_position(b),
            _ => false,
        }
    }

    // ---------------------------------------------------------------
    // Capabilities
    // ---------------------------------------------------------------

    fn native_capabilities(&self) -> OperationSet {
        match &self.backing {
            Backing::Store(backend) => backend.capabilities(),
            // Entries are never written through; only read operations reach
            // the format.
            Backing::Entry(entry) => entry.format.capabilities().intersection(OperationSet::READ_ONLY),
        }
    }

    /// Operations this node supports, including the generic ones derived
    /// from the native set.
    pub fn capabilities(&self) -> OperationSet {
        let native = self.native_capabilities();
        let mut set = native.with(Operation::Exists);
        if self.archive.is_some() {
            set = set.with(Operation::List);
        }
        if native.contains(Operation::Read) {
            set = set.with(Operation::Copy);
        }
        if native.contains(Operation::Rename)
            || (native.contains(Operation::Read) && native.contains(Operation::Delete))
        {
            set = set.with(Operation::Move);
        }
        if self.changeable_mask().is_empty() {
            set = set.without(Operation::ChangePermission);
        }
        set
    }

    pub fn supports(&self, op: Operation) -> bool {
        self.capabilities().contains(op)
    }

    fn gate(&self, op: Operation) -> VfaResult<()> {
        if self.supports(op) {
            Ok(())
        } else {
            tracing::debug!("{} not supported on {}", op, self.location);
            Err(VfaError::Unsupported(op))
        }
    }

    fn store(&self, op: Operation) -> VfaResult<&Arc<dyn Backend>> {
        match &self.backing {
            Backing::Store(backend) => Ok(backend),
            Backing::Entry(_) => Err(VfaError::NotImplemented(op)),
        }
    }

    /// Backend shared with `other`, if both are backed by the same one.
    fn shared_backend(&self, other: &Node) -> Option<&Arc<dyn Backend>> {
        match (&self.backing, &other.backing) {
            (Backing::Store(a), Backing::Store(b))
                if Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>() =>
            {
                Some(a)
            }
            _ => None,
        }
    }

    // ---------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------

    /// Current attributes, or `None` if nothing exists here.
    pub fn metadata(&self) -> VfaResult<Option<Metadata>> {
        match &self.backing {
            Backing::Store(backend) => backend.metadata(&self.location_with_credentials()),
            Backing::Entry(entry) => {
                let owner = match entry.owner(&self.vfs) {
                    Ok(owner) => owner,
                    Err(VfaError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e),
                };
                let Some(layer) = owner.archive_layer() else {
                    return Ok(None);
                };
                match layer.index(&owner) {
                    Ok(index) => Ok(index.entry(&entry.path).map(ArchiveEntry::to_metadata)),
                    Err(VfaError::NotFound(_) | VfaError::NotAFile(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn existing_metadata(&self) -> VfaResult<Metadata> {
        self.metadata()?.ok_or_else(|| self.not_found())
    }

    pub fn exists(&self) -> VfaResult<bool> {
        self.gate(Operation::Exists)?;
        Ok(self.metadata()?.is_some())
    }

    pub fn is_directory(&self) -> VfaResult<bool> {
        Ok(self.metadata()?.is_some_and(|m| m.is_directory()))
    }

    /// Directory, or a readable archive.
    pub fn is_browsable(&self) -> VfaResult<bool> {
        match self.metadata()? {
            None => Ok(false),
            Some(meta) if meta.is_directory() => Ok(true),
            Some(_) => self.archive_content_matches(),
        }
    }

    /// Existing file whose name and content both match an archive format.
    /// Only such nodes have their entries resolved as children.
    pub fn is_readable_archive(&self) -> VfaResult<bool> {
        if self.archive.is_none() {
            return Ok(false);
        }
        match self.metadata()? {
            Some(meta) if !meta.is_directory() => self.archive_content_matches(),
            _ => Ok(false),
        }
    }

    fn archive_content_matches(&self) -> VfaResult<bool> {
        match &self.archive {
            Some(layer) => layer.signature_matches(self),
            None => Ok(false),
        }
    }

    /// Size in bytes; directories report 0.
    pub fn size(&self) -> VfaResult<u64> {
        Ok(self.existing_metadata()?.display_size())
    }

    pub fn date(&self) -> VfaResult<Option<DateTime<Utc>>> {
        Ok(self.existing_metadata()?.modified)
    }

    pub fn permissions(&self) -> VfaResult<FilePermissions> {
        Ok(self
            .existing_metadata()?
            .permissions
            .unwrap_or(FilePermissions::new(0, PermissionMask::NONE)))
    }

    /// Positions of [`Node::permissions`] that carry meaning.
    pub fn permission_mask(&self) -> PermissionMask {
        match &self.backing {
            Backing::Store(backend) => backend.readable_permissions(),
            Backing::Entry(_) => PermissionMask::ALL,
        }
    }

    /// Positions [`Node::change_permission`] may alter.
    pub fn changeable_mask(&self) -> PermissionMask {
        match &self.backing {
            Backing::Store(backend)
                if backend.capabilities().contains(Operation::ChangePermission) =>
            {
                backend.changeable_permissions()
            }
            _ => PermissionMask::NONE,
        }
    }

    pub fn owner(&self) -> VfaResult<Option<String>> {
        Ok(self.existing_metadata()?.owner)
    }

    pub fn group(&self) -> VfaResult<Option<String>> {
        Ok(self.existing_metadata()?.group)
    }

    // ---------------------------------------------------------------
    // Listing
    // ---------------------------------------------------------------

    /// Children in the order the store reports them.
    pub fn ls(&self) -> VfaResult<Vec<Arc<Node>>> {
        self.gate(Operation::List)?;
        let meta = self.existing_metadata()?;
        let location = self.location_with_credentials();

        if !meta.is_directory() {
            let Some(layer) = &self.archive else {
                return Err(VfaError::NotADirectory(self.location.to_string()));
            };
            let me = self.arc()?;
            let index = layer.index(self)?;
            let names = index.children("").unwrap_or_default();
            return names
                .iter()
                .map(|name| {
                    let entry = EntryRef::new(&me, layer.format().clone(), name.clone());
                    self.publish_child(&location, name, Backing::Entry(entry))
                })
                .collect();
        }

        match &self.backing {
            Backing::Store(backend) => backend
                .list(&location)?
                .iter()
                .map(|name| self.publish_child(&location, name, Backing::Store(backend.clone())))
                .collect(),
            Backing::Entry(entry) => {
                let owner = entry.owner(&self.vfs)?;
                let layer = owner_layer(&owner)?;
                let index = layer.index(&owner)?;
                let names = index
                    .children(&entry.path)
                    .ok_or_else(|| VfaError::NotADirectory(self.location.to_string()))?;
                names
                    .iter()
                    .map(|name| {
                        let child = EntryRef::new(&owner, layer.format().clone(), entry.child_path(name));
                        self.publish_child(&location, name, Backing::Entry(child))
                    })
                    .collect()
            }
        }
    }

    fn publish_child(&self, parent: &Location, name: &str, backing: Backing) -> VfaResult<Arc<Node>> {
        let location = parent.resolve_direct_child(name)?;
        Ok(self.vfs.publish(&location, backing))
    }

    // ---------------------------------------------------------------
    // Streams
    // ---------------------------------------------------------------

    fn archive_entry(&self, entry: &EntryRef) -> VfaResult<(Arc<Node>, Arc<dyn ArchiveFormat>, ArchiveEntry)> {
        let owner = entry.owner(&self.vfs)?;
        let layer = owner_layer(&owner)?;
        let found = layer
            .index(&owner)?
            .entry(&entry.path)
            .cloned()
            .ok_or_else(|| self.not_found())?;
        if found.is_directory {
            return Err(VfaError::NotAFile(self.location.to_string()));
        }
        let format = layer.format().clone();
        Ok((owner, format, found))
    }

    pub fn input(&self) -> VfaResult<InputStream> {
        self.gate(Operation::Read)?;
        match &self.backing {
            Backing::Store(backend) => backend.open_read(&self.location_with_credentials()),
            Backing::Entry(entry) => {
                let (owner, format, found) = self.archive_entry(entry)?;
                format.open_entry(owner.content_random_access()?, &found)
            }
        }
    }

    pub fn random_input(&self) -> VfaResult<Box<dyn RandomRead>> {
        self.gate(Operation::RandomRead)?;
        match &self.backing {
            Backing::Store(backend) => backend.open_random_read(&self.location_with_credentials()),
            Backing::Entry(entry) => {
                let (owner, format, found) = self.archive_entry(entry)?;
                format.open_random_entry(owner.content_random_access()?, &found)
            }
        }
    }

    /// Random access to the content, buffered in memory when the node
    /// only streams.
    pub(crate) fn content_random_access(&self) -> VfaResult<Box<dyn RandomRead>> {
        if self.supports(Operation::RandomRead) {
            return self.random_input();
        }
        let mut stream = self.input()?;
        Ok(Box::new(MemoryRandomAccess::from_reader(&mut stream)?))
    }

    /// Truncating writer; creates the file if absent.
    pub fn output(&self) -> VfaResult<OutputStream> {
        self.gate(Operation::Write)?;
        self.store(Operation::Write)?
            .open_write(&self.location_with_credentials(), false)
    }

    /// Writer positioned at the end of the current content.
    pub fn append_output(&self) -> VfaResult<OutputStream> {
        self.gate(Operation::Append)?;
        self.store(Operation::Append)?
            .open_write(&self.location_with_credentials(), true)
    }

    pub fn random_output(&self) -> VfaResult<Box<dyn RandomWrite>> {
        self.gate(Operation::RandomWrite)?;
        self.store(Operation::RandomWrite)?
            .open_random_write(&self.location_with_credentials())
    }

    // ---------------------------------------------------------------
    // Creation and removal
    // ---------------------------------------------------------------

    pub fn mkdir(&self) -> VfaResult<()> {
        self.gate(Operation::CreateDirectory)?;
        if self.metadata()?.is_some() {
            return Err(VfaError::AlreadyExists(self.location.to_string()));
        }
        self.store(Operation::CreateDirectory)?
            .create_directory(&self.location_with_credentials())
    }

    pub fn mkfile(&self) -> VfaResult<()> {
        self.gate(Operation::CreateFile)?;
        if self.metadata()?.is_some() {
            return Err(VfaError::AlreadyExists(self.location.to_string()));
        }
        self.store(Operation::CreateFile)?
            .create_file(&self.location_with_credentials())
    }

    /// Create this directory and any missing ancestors.
    pub fn mkdirs(&self) -> VfaResult<()> {
        self.gate(Operation::CreateDirectory)?;
        let backend = self.store(Operation::CreateDirectory)?;

        let mut missing = Vec::new();
        let mut current = Some(self.location_with_credentials());
        while let Some(location) = current {
            match backend.metadata(&location)? {
                Some(meta) if meta.is_directory() => break,
                Some(_) => return Err(VfaError::NotADirectory(location.to_string())),
                None => {
                    current = location.parent();
                    missing.push(location);
                }
            }
        }

        for location in missing.iter().rev() {
            tracing::trace!("Creating directory {}", location);
            backend.create_directory(location)?;
        }
        Ok(())
    }

    /// Remove a file or an empty directory.
    pub fn delete(&self) -> VfaResult<()> {
        self.gate(Operation::Delete)?;
        let meta = self.existing_metadata()?;
        let backend = self.store(Operation::Delete)?;
        let location = self.location_with_credentials();
        if meta.is_directory()
            && backend.capabilities().contains(Operation::List)
            && !backend.list(&location)?.is_empty()
        {
            return Err(VfaError::DirectoryNotEmpty(self.location.to_string()));
        }
        backend.delete(&location)?;
        self.invalidate_archive();
        Ok(())
    }

    fn delete_tree(&self, meta: &Metadata) -> VfaResult<()> {
        if meta.is_directory() {
            for child in self.ls()? {
                if let Some(child_meta) = child.metadata()? {
                    child.delete_tree(&child_meta)?;
                }
            }
        }
        self.delete()
    }

    fn invalidate_archive(&self) {
        if let Some(layer) = &self.archive {
            layer.invalidate();
        }
    }

    // ---------------------------------------------------------------
    // Transfers
    // ---------------------------------------------------------------

    fn check_transfer(&self, dest: &Node) -> VfaResult<Metadata> {
        if self.location == dest.location {
            return Err(TransferError::SameFile(self.location.to_string()).into());
        }
        let meta = self
            .metadata()?
            .ok_or_else(|| TransferError::SourceMissing(self.location.to_string()))?;
        if meta.is_directory() && dest.location.starts_with(&self.location) {
            return Err(TransferError::DestinationInsideSource {
                src: self.location.to_string(),
                dest: dest.location.to_string(),
            }
            .into());
        }
        Ok(meta)
    }

    fn cross_backend(&self, dest: &Node) -> VfaError {
        TransferError::CrossBackend {
            src: self.location.to_string(),
            dest: dest.location.to_string(),
        }
        .into()
    }

    /// Copy content to `dest`, replacing what is there. Directories are
    /// copied recursively.
    pub fn copy_to(&self, dest: &Node) -> VfaResult<()> {
        self.gate(Operation::Copy)?;
        let meta = self.check_transfer(dest)?;
        tracing::debug!("Copying {} to {}", self.location, dest.location);
        self.copy_tree(dest, &meta)
    }

    fn copy_tree(&self, dest: &Node, meta: &Metadata) -> VfaResult<()> {
        if meta.is_directory() {
            dest.mkdirs()?;
            for child in self.ls()? {
                let Some(child_meta) = child.metadata()? else {
                    continue;
                };
                child.copy_tree(&*dest.child(child.name())?, &child_meta)?;
            }
            return Ok(());
        }

        if let Some(backend) = self.shared_backend(dest) {
            if backend.capabilities().contains(Operation::CopyRemote) {
                backend.copy_remote(&self.location_with_credentials(), &dest.location_with_credentials())?;
                dest.invalidate_archive();
                return Ok(());
            }
        }

        let mut input = self.input()?;
        let mut output = dest.output()?;
        let copied = copy_stream(&mut input, &mut output, self.vfs.config().copy_buffer_size)?;
        drop(output);
        tracing::trace!("Copied {} bytes to {}", copied, dest.location);
        dest.invalidate_archive();
        Ok(())
    }

    /// Copy using the backend's own copy, without streaming the content
    /// through this process.
    pub fn copy_remotely_to(&self, dest: &Node) -> VfaResult<()> {
        self.gate(Operation::CopyRemote)?;
        let meta = self.check_transfer(dest)?;
        let backend = self.shared_backend(dest).ok_or_else(|| self.cross_backend(dest))?;
        self.copy_remote_tree(backend, dest, &meta)
    }

    fn copy_remote_tree(&self, backend: &Arc<dyn Backend>, dest: &Node, meta: &Metadata) -> VfaResult<()> {
        if meta.is_directory() {
            dest.mkdirs()?;
            for child in self.ls()? {
                let Some(child_meta) = child.metadata()? else {
                    continue;
                };
                child.copy_remote_tree(backend, &*dest.child(child.name())?, &child_meta)?;
            }
            return Ok(());
        }
        backend.copy_remote(&self.location_with_credentials(), &dest.location_with_credentials())?;
        dest.invalidate_archive();
        Ok(())
    }

    /// Move to `dest`: a native rename when both nodes share a backend that
    /// renames, copy and delete otherwise.
    pub fn move_to(&self, dest: &Node) -> VfaResult<()> {
        self.gate(Operation::Move)?;
        let meta = self.check_transfer(dest)?;
        tracing::debug!("Moving {} to {}", self.location, dest.location);

        if let Some(backend) = self.shared_backend(dest) {
            if backend.capabilities().contains(Operation::Rename) {
                backend.rename(&self.location_with_credentials(), &dest.location_with_credentials())?;
                self.invalidate_archive();
                dest.invalidate_archive();
                return Ok(());
            }
        }

        self.copy_tree(dest, &meta)?;
        self.delete_tree(&meta)
    }

    /// Native rename; both nodes must live on the same backend.
    pub fn rename_to(&self, dest: &Node) -> VfaResult<()> {
        self.gate(Operation::Rename)?;
        self.check_transfer(dest)?;
        let backend = self.shared_backend(dest).ok_or_else(|| self.cross_backend(dest))?;
        backend.rename(&self.location_with_credentials(), &dest.location_with_credentials())?;
        self.invalidate_archive();
        dest.invalidate_archive();
        Ok(())
    }

    // ---------------------------------------------------------------
    // Attribute changes
    // ---------------------------------------------------------------

    pub fn change_permission(
        &self,
        access: PermissionAccess,
        kind: PermissionKind,
        enabled: bool,
    ) -> VfaResult<()> {
        self.gate(Operation::ChangePermission)?;
        if !self.changeable_mask().contains(access, kind) {
            return Err(VfaError::NotChangeable { access, kind });
        }
        let mode = self.permissions()?.with(access, kind, enabled).to_mode();
        self.store(Operation::ChangePermission)?
            .set_permissions(&self.location_with_credentials(), mode)
    }

    /// Apply a whole mode value. Bits outside [`Node::changeable_mask`]
    /// must match the current value.
    pub fn change_permissions(&self, mode: u16) -> VfaResult<()> {
        self.gate(Operation::ChangePermission)?;
        let changeable = self.changeable_mask();
        let current = self.permissions()?;
        let requested = mode & 0o777;

        let differing = (requested ^ current.to_mode()) & current.mask().0 & !changeable.0;
        if let Some((access, kind)) = PermissionMask(differing).positions().next() {
            return Err(VfaError::NotChangeable { access, kind });
        }

        let merged = (current.to_mode() & !changeable.0) | (requested & changeable.0);
        self.store(Operation::ChangePermission)?
            .set_permissions(&self.location_with_credentials(), merged)
    }

    pub fn change_date(&self, modified: DateTime<Utc>) -> VfaResult<()> {
        self.gate(Operation::ChangeDate)?;
        self.store(Operation::ChangeDate)?
            .set_modified(&self.location_with_credentials(), modified)
    }

    pub fn free_space(&self) -> VfaResult<u64> {
        self.gate(Operation::GetFreeSpace)?;
        Ok(self
            .store(Operation::GetFreeSpace)?
            .space(&self.location_with_credentials())?
            .free)
    }

    pub fn total_space(&self) -> VfaResult<u64> {
        self.gate(Operation::GetTotalSpace)?;
        Ok(self
            .store(Operation::GetTotalSpace)?
            .space(&self.location_with_credentials())?
            .total)
    }

    /// Lower-case hex digest of the full content.
    pub fn checksum(&self, algorithm: &str) -> VfaResult<String> {
        let digest = self.vfs.checksums().digest(algorithm)?;
        let reader = ChecksumReader::new(self.input()?, digest);
        Ok(reader.finish()?)
    }
}

fn owner_layer(owner: &Node) -> VfaResult<&ArchiveLayer> {
    owner
        .archive_layer()
        .ok_or_else(|| VfaError::Archive(format!("{} is not an archive", owner.location)))
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.location, f)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("location", &self.location)
            .field("archive", &self.archive.as_ref().map(|a| a.format().name().to_string()))
            .field("entry", &matches!(self.backing, Backing::Entry(_)))
            .finish()
    }
}
