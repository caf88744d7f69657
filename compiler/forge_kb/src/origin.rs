//! Configuration contexts and prefix matching.
//!
//! An [`Origin`] is the environment a group of sources was configured
//! under: where to run the compiler, include paths, extra options, and the
//! prefix maps that tell discovery where modules with a given name prefix
//! may be found.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hash::{combine_hashes, hash_strings, ContentHash};
use crate::reference::module_name;

/// Handle to an [`Origin`] stored in a knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OriginId(pub(crate) usize);

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "origin#{}", self.0)
    }
}

/// A name prefix and the directories that may provide matching modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixMap {
    pub prefix: String,
    pub directories: Vec<PathBuf>,
}

impl PrefixMap {
    pub fn new(prefix: impl Into<String>, directories: Vec<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            directories,
        }
    }

    /// Does this map cover the module `name`?
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match_prefix(&self.prefix, name)
    }
}

/// Configuration context shared by every source loaded from one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Identity: the config file (or directory) this origin was loaded from.
    pub config_path: PathBuf,
    pub working_dir: PathBuf,
    pub include_paths: Vec<PathBuf>,
    pub options: Vec<String>,
    /// Covers `include_paths` and `options`; kept in sync by the builders.
    pub settings_hash: ContentHash,
    pub prefix_maps: Vec<PrefixMap>,
}

impl Origin {
    pub fn new(config_path: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        let mut origin = Self {
            config_path: config_path.into(),
            working_dir: working_dir.into(),
            include_paths: Vec::new(),
            options: Vec::new(),
            settings_hash: ContentHash::default(),
            prefix_maps: Vec::new(),
        };
        origin.rehash();
        origin
    }

    #[must_use]
    pub fn with_include(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self.rehash();
        self
    }

    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self.rehash();
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>, directories: Vec<PathBuf>) -> Self {
        self.prefix_maps.push(PrefixMap::new(prefix, directories));
        self
    }

    /// Recompute `settings_hash` from includes and options.
    pub fn rehash(&mut self) {
        let includes = hash_strings(
            self.include_paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned()),
        );
        let options = hash_strings(&self.options);
        self.settings_hash = combine_hashes(&[includes, options]);
    }

    /// Directories of every prefix map that covers `name`, in map order.
    pub fn candidate_directories<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Path> {
        self.prefix_maps
            .iter()
            .filter(move |map| map.matches(name))
            .flat_map(|map| map.directories.iter().map(PathBuf::as_path))
    }
}

/// Match a module `name` against a prefix-map `prefix`.
///
/// - equal strings match;
/// - a prefix ending in `%` matches any name starting with the rest,
///   character for character (`net%` matches `network`);
/// - otherwise the prefix must be a dot-delimited ancestor (`net` matches
///   `net.http` but not `network`).
///
/// A partition suffix (`:part`) on the name is ignored.
#[must_use]
pub fn match_prefix(prefix: &str, name: &str) -> bool {
    let name = module_name(name);
    if prefix == name {
        return true;
    }
    if let Some(literal) = prefix.strip_suffix('%') {
        return name.starts_with(literal);
    }
    name.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.'))
}
