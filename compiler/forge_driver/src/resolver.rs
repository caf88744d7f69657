//! Plain-directory configuration source.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use forge_kb::{ConfigError, Origin, Resolver, SourceMap};

/// Extensions treated as compile units.
pub const SOURCE_EXTENSIONS: &[&str] = &["cppm", "ixx", "mpp", "cpp", "cc", "cxx", "c"];

/// Resolver for directories without a config file.
///
/// Every file with a [`SOURCE_EXTENSIONS`] extension is a unit. Every
/// subdirectory becomes a prefix map named after it, so an import of
/// `net.http` is searched for in `./net`. The directory itself is the
/// origin's identity and working directory.
#[derive(Debug, Clone, Default)]
pub struct DirResolver {
    include_paths: Vec<PathBuf>,
    options: Vec<String>,
}

impl DirResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include path added to every origin.
    #[must_use]
    pub fn with_include(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    /// Compiler option added to every origin.
    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }
}

fn is_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

impl Resolver for DirResolver {
    fn load_map(&self, path: &Path) -> Result<SourceMap, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        for entry in fs::read_dir(path).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let file_type = entry.file_type().map_err(io_err)?;
            let entry_path = entry.path();
            if file_type.is_dir() {
                subdirs.push(entry_path);
            } else if is_source(&entry_path) {
                files.push(entry_path);
            }
        }
        files.sort();
        subdirs.sort();

        let mut origin = Origin::new(path, path);
        for include in &self.include_paths {
            origin = origin.with_include(include.clone());
        }
        for option in &self.options {
            origin = origin.with_option(option.clone());
        }
        for dir in subdirs {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                tracing::debug!(dir = %dir.display(), "skipping non-UTF-8 directory");
                continue;
            };
            origin = origin.with_prefix(name, vec![dir]);
        }

        tracing::trace!(dir = %path.display(), files = files.len(), "scanned directory");
        Ok(SourceMap {
            files,
            origin,
            targets: Vec::new(),
        })
    }

    /// A directory changes when entries are added, removed or renamed.
    fn detect_change(&self, origin: &Origin, since: SystemTime) -> bool {
        fs::metadata(&origin.config_path)
            .and_then(|meta| meta.modified())
            .map_or(true, |modified| modified > since)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
