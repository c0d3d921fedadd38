// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage backend trait
//!
//! A backend serves every location of one scheme. It declares its native
//! operations once through [`Backend::capabilities`]; nodes consult that set
//! before dispatching, so a method outside the set is never called. Optional
//! methods default to [`VfaError::NotImplemented`], which only surfaces if a
//! backend declares an operation it forgot to implement.

use chrono::{DateTime, Utc};
use std::io::{Read, Write};

use crate::error::{VfaError, VfaResult};
use crate::location::Location;
use crate::metadata::Metadata;
use crate::operation::{Operation, OperationSet};
use crate::permissions::PermissionMask;
use crate::platform::SpaceInfo;
use crate::stream::{RandomRead, RandomWrite};

/// Byte reader handed out by backends
pub type InputStream = Box<dyn Read + Send>;

/// Byte writer handed out by backends
pub type OutputStream = Box<dyn Write + Send>;

/// Storage backend trait
pub trait Backend: Send + Sync {
    fn scheme(&self) -> &str;
    fn display_name(&self) -> &str;

    /// Native operations of this backend; fixed for its lifetime.
    fn capabilities(&self) -> OperationSet;

    fn readable_permissions(&self) -> PermissionMask {
        PermissionMask::NONE
    }

    fn changeable_permissions(&self) -> PermissionMask {
        PermissionMask::NONE
    }

    /// Attributes of `location`, or `None` if nothing exists there.
    fn metadata(&self, location: &Location) -> VfaResult<Option<Metadata>>;

    /// Names of the direct children of a directory.
    fn list(&self, _location: &Location) -> VfaResult<Vec<String>> {
        Err(VfaError::NotImplemented(Operation::List))
    }

    fn open_read(&self, _location: &Location) -> VfaResult<InputStream> {
        Err(VfaError::NotImplemented(Operation::Read))
    }

    fn open_random_read(&self, _location: &Location) -> VfaResult<Box<dyn RandomRead>> {
        Err(VfaError::NotImplemented(Operation::RandomRead))
    }

    /// Truncating writer, or an appending one when `append` is set.
    fn open_write(&self, _location: &Location, append: bool) -> VfaResult<OutputStream> {
        Err(VfaError::NotImplemented(if append {
            Operation::Append
        } else {
            Operation::Write
        }))
    }

    fn open_random_write(&self, _location: &Location) -> VfaResult<Box<dyn RandomWrite>> {
        Err(VfaError::NotImplemented(Operation::RandomWrite))
    }

    fn create_file(&self, _location: &Location) -> VfaResult<()> {
        Err(VfaError::NotImplemented(Operation::CreateFile))
    }

    fn create_directory(&self, _location: &Location) -> VfaResult<()> {
        Err(VfaError::NotImplemented(Operation::CreateDirectory))
    }

    /// Remove a file or an empty directory.
    fn delete(&self, _location: &Location) -> VfaResult<()> {
        Err(VfaError::NotImplemented(Operation::Delete))
    }

    /// Native rename within this backend, replacing `to` if present.
    fn rename(&self, _from: &Location, _to: &Location) -> VfaResult<()> {
        Err(VfaError::NotImplemented(Operation::Rename))
    }

    /// Server-side copy within this backend, replacing `to` if present.
    fn copy_remote(&self, _from: &Location, _to: &Location) -> VfaResult<()> {
        Err(VfaError::NotImplemented(Operation::CopyRemote))
    }

    fn set_permissions(&self, _location: &Location, _mode: u16) -> VfaResult<()> {
        Err(VfaError::NotImplemented(Operation::ChangePermission))
    }

    fn set_modified(&self, _location: &Location, _modified: DateTime<Utc>) -> VfaResult<()> {
        Err(VfaError::NotImplemented(Operation::ChangeDate))
    }

    fn space(&self, _location: &Location) -> VfaResult<SpaceInfo> {
        Err(VfaError::NotImplemented(Operation::GetFreeSpace))
    }
}
