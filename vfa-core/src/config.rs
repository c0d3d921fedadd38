// SPDX-License-Identifier: AGPL-3.0-or-later
//! Virtual file system configuration

use serde::{Deserialize, Serialize};

/// Tunables of a [`crate::Vfs`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Buffer used when streaming content between nodes
    pub copy_buffer_size: usize,
    /// Identity cache insertions between purges of dead slots
    pub purge_interval: u64,
    /// Treat files with a registered archive extension as directories
    pub detect_archives: bool,
    /// Deepest archive nesting followed during resolution
    pub max_archive_depth: usize,
    /// Algorithm used when none is named
    pub default_checksum: String,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            copy_buffer_size: 64 * 1024,
            purge_interval: 256,
            detect_archives: true,
            max_archive_depth: 8,
            default_checksum: "SHA-256".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VfsConfig::default();
        assert_eq!(config.copy_buffer_size, 65536);
        assert_eq!(config.purge_interval, 256);
        assert!(config.detect_archives);
        assert_eq!(config.default_checksum, "SHA-256");
    }
}
