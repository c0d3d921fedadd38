// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the virtual file layer

use thiserror::Error;

use crate::operation::Operation;
use crate::permissions::{PermissionAccess, PermissionKind};

/// Result type alias
pub type VfaResult<T> = Result<T, VfaError>;

/// Copy/move precondition violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("source and destination are the same file: {0}")]
    SameFile(String),

    #[error("source does not exist: {0}")]
    SourceMissing(String),

    #[error("destination {dest} is inside source directory {src}")]
    DestinationInsideSource { src: String, dest: String },

    #[error("{src} and {dest} live on different backends")]
    CrossBackend { src: String, dest: String },
}

/// Main error type
#[derive(Error, Debug)]
pub enum VfaError {
    #[error("Unsupported operation: {0}")]
    Unsupported(Operation),

    #[error("Operation declared but not implemented by backend: {0}")]
    NotImplemented(Operation),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Malformed location: {0}")]
    MalformedLocation(String),

    #[error("Unexpected end of input")]
    EndOfInput,

    #[error("Unknown checksum algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("No provider registered for scheme: {0}")]
    NoProvider(String),

    #[error("Permission bit {access:?}/{kind:?} cannot be changed on this backend")]
    NotChangeable {
        access: PermissionAccess,
        kind: PermissionKind,
    },

    #[error("Archive error: {0}")]
    Archive(String),
}

impl VfaError {
    /// Backend-level I/O faults, as opposed to capability or usage errors.
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            VfaError::Io(_)
                | VfaError::NotFound(_)
                | VfaError::AlreadyExists(_)
                | VfaError::PermissionDenied(_)
                | VfaError::NotADirectory(_)
                | VfaError::NotAFile(_)
                | VfaError::DirectoryNotEmpty(_)
                | VfaError::Archive(_)
        )
    }

    pub fn is_transfer_failure(&self) -> bool {
        matches!(self, VfaError::Transfer(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, VfaError::Unsupported(_))
    }

    /// Map a raw `io::Error` for `path` onto the closest typed variant.
    pub fn from_io(err: std::io::Error, path: impl Into<String>) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => VfaError::NotFound(path.into()),
            ErrorKind::AlreadyExists => VfaError::AlreadyExists(path.into()),
            ErrorKind::PermissionDenied => VfaError::PermissionDenied(path.into()),
            ErrorKind::UnexpectedEof => VfaError::EndOfInput,
            _ => VfaError::Io(err),
        }
    }
}

impl From<VfaError> for std::io::Error {
    fn from(err: VfaError) -> Self {
        use std::io::ErrorKind;
        match err {
            VfaError::Io(e) => e,
            VfaError::NotFound(p) => std::io::Error::new(ErrorKind::NotFound, p),
            VfaError::AlreadyExists(p) => std::io::Error::new(ErrorKind::AlreadyExists, p),
            VfaError::PermissionDenied(p) => std::io::Error::new(ErrorKind::PermissionDenied, p),
            VfaError::EndOfInput => ErrorKind::UnexpectedEof.into(),
            VfaError::Unsupported(op) | VfaError::NotImplemented(op) => {
                std::io::Error::new(ErrorKind::Unsupported, op.name())
            }
            other => std::io::Error::new(ErrorKind::Other, other.to_string()),
        }
    }
}
