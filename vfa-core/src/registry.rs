// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registry of backends and archive formats

use std::collections::HashMap;
use std::sync::Arc;

use crate::archive::ArchiveFormat;
use crate::backend::Backend;
use crate::error::{VfaError, VfaResult};

/// Backends by scheme, plus the archive formats recognized by name
pub struct ProviderRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
    archive_formats: Vec<Arc<dyn ArchiveFormat>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { backends: HashMap::new(), archive_formats: Vec::new() }
    }

    /// Register a backend, replacing any previous one for its scheme.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.scheme().to_ascii_lowercase(), backend);
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(&scheme.to_ascii_lowercase()).cloned()
    }

    pub fn get_or_err(&self, scheme: &str) -> VfaResult<Arc<dyn Backend>> {
        self.get(scheme).ok_or_else(|| VfaError::NoProvider(scheme.to_string()))
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.backends.keys().map(|s| s.as_str()).collect();
        schemes.sort_unstable();
        schemes
    }

    pub fn unregister(&mut self, scheme: &str) -> Option<Arc<dyn Backend>> {
        self.backends.remove(&scheme.to_ascii_lowercase())
    }

    /// Register an archive format, replacing one with the same name.
    pub fn register_archive_format(&mut self, format: Arc<dyn ArchiveFormat>) {
        self.archive_formats.retain(|f| f.name() != format.name());
        self.archive_formats.push(format);
    }

    pub fn unregister_archive_format(&mut self, name: &str) -> bool {
        let before = self.archive_formats.len();
        self.archive_formats.retain(|f| f.name() != name);
        self.archive_formats.len() != before
    }

    pub fn archive_formats(&self) -> &[Arc<dyn ArchiveFormat>] {
        &self.archive_formats
    }

    /// Format whose extension matches `file_name`; the longest matching
    /// extension wins, so `tar.gz` beats `gz`.
    pub fn archive_format_for(&self, file_name: &str) -> Option<Arc<dyn ArchiveFormat>> {
        self.archive_formats
            .iter()
            .filter_map(|f| f.match_len(file_name).map(|len| (len, f)))
            .max_by_key(|(len, _)| *len)
            .map(|(_, f)| f.clone())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveEntry;
    use crate::backend::InputStream;
    use crate::stream::RandomRead;

    struct NamedFormat(&'static str, &'static [&'static str]);

    impl ArchiveFormat for NamedFormat {
        fn name(&self) -> &str {
            self.0
        }

        fn extensions(&self) -> &[&str] {
            self.1
        }

        fn read_index(&self, _archive: &mut dyn RandomRead) -> VfaResult<Vec<ArchiveEntry>> {
            Ok(Vec::new())
        }

        fn open_entry(
            &self,
            _archive: Box<dyn RandomRead>,
            entry: &ArchiveEntry,
        ) -> VfaResult<InputStream> {
            Err(VfaError::NotFound(entry.path.clone()))
        }
    }

    #[test]
    fn test_longest_extension_wins() {
        let mut reg = ProviderRegistry::new();
        reg.register_archive_format(Arc::new(NamedFormat("gzip", &["gz"])));
        reg.register_archive_format(Arc::new(NamedFormat("tgz", &["tar.gz", "tgz"])));

        assert_eq!(reg.archive_format_for("x.TAR.GZ").unwrap().name(), "tgz");
        assert_eq!(reg.archive_format_for("x.gz").unwrap().name(), "gzip");
        assert!(reg.archive_format_for("gz").is_none());
        assert!(reg.archive_format_for("x.tar").is_none());
    }

    #[test]
    fn test_unregister_archive_format() {
        let mut reg = ProviderRegistry::new();
        reg.register_archive_format(Arc::new(NamedFormat("gzip", &["gz"])));
        assert!(reg.unregister_archive_format("gzip"));
        assert!(!reg.unregister_archive_format("gzip"));
        assert!(reg.archive_format_for("a.gz").is_none());
    }

    #[test]
    fn test_missing_backend() {
        let reg = ProviderRegistry::default();
        assert!(matches!(reg.get_or_err("smb"), Err(VfaError::NoProvider(s)) if s == "smb"));
        assert!(reg.schemes().is_empty());
    }
}
