// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage providers for VFA
//!
//! Local disk, a volatile in-memory store and the tar archive format, plus
//! the platform bridges the local backend runs on.

mod local;
pub mod memory;
pub mod platform;
pub mod tar;

use std::sync::Arc;

use vfa_core::{ProviderRegistry, Vfs, VfsConfig};

pub use local::LocalBackend;
pub use memory::{MemoryBackend, MEMORY_SCHEME};
pub use tar::{TarBuilder, TarFormat};

/// Registry with every provider of this crate.
pub fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(LocalBackend::new()));
    registry.register(Arc::new(MemoryBackend::new()));
    registry.register_archive_format(Arc::new(TarFormat));
    registry
}

/// File system over [`default_registry`].
pub fn default_vfs(config: VfsConfig) -> Vfs {
    Vfs::with_config(default_registry(), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = default_registry();
        assert_eq!(registry.schemes(), ["file", "mem"]);
        assert!(registry.archive_format_for("backup.TAR").is_some());
        assert!(registry.archive_format_for("backup.tgz").is_none());
    }
}
