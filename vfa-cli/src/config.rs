// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration file loading

use std::path::{Path, PathBuf};
use thiserror::Error;

use vfa_core::VfsConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// `config.toml` in the user's configuration directory.
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "hyperpolymath", "vfa")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load the explicit file, else the default file if present, else defaults.
pub fn load(explicit: Option<&Path>) -> Result<VfsConfig, ConfigError> {
    match explicit {
        Some(path) => read(path),
        None => match default_path() {
            Some(path) if path.is_file() => read(&path),
            _ => Ok(VfsConfig::default()),
        },
    }
}

fn read(path: &Path) -> Result<VfsConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "copy_buffer_size = 4096\ndetect_archives = false\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.copy_buffer_size, 4096);
        assert!(!config.detect_archives);
        assert_eq!(config.default_checksum, VfsConfig::default().default_checksum);
    }

    #[test]
    fn test_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(load(Some(&missing)), Err(ConfigError::Read { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "purge_interval = \"often\"").unwrap();
        let err = load(Some(&bad)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }
}
