//! Contracts for the external collaborators.
//!
//! The knowledge base never runs a compiler or parses a config file itself.
//! It talks to a [`Compiler`] (scan, compile, link, staleness) and a
//! [`Resolver`] (configuration sources), both supplied by the caller through
//! a [`BuildSession`].

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ScanFailure, ToolError};
use crate::hash::ContentHash;
use crate::origin::Origin;
use crate::reference::{RefKind, Reference};
use crate::source::SourceDef;

/// What a scan learned about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutput {
    pub name: String,
    pub kind: RefKind,
    /// Header references carry normalized absolute paths as names.
    pub required: Vec<Reference>,
    pub exported: Vec<Reference>,
}

/// A built module interface handed to the compiler for one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleArtifact {
    pub reference: Reference,
    pub source_path: PathBuf,
    pub interface_path: PathBuf,
}

/// Outputs of one compilation. A path is empty if the kind has no such
/// output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub interface: PathBuf,
    pub object: PathBuf,
}

/// Freshness of a file relative to a threshold time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    NotModified,
    Modified,
    /// The file no longer exists.
    Missing,
}

/// Scans, compiles and links single units.
pub trait Compiler: Send + Sync {
    fn scan(&self, origin: Option<&Origin>, path: &Path) -> Result<ScanOutput, ScanFailure>;

    /// `modules` is the full set of interfaces visible to the unit,
    /// including those reachable through re-exports.
    fn compile(
        &self,
        origin: Option<&Origin>,
        source: &SourceDef,
        modules: &[ModuleArtifact],
    ) -> Result<ArtifactPaths, ToolError>;

    fn link(&self, objects: &[PathBuf], output: &Path) -> Result<(), ToolError>;

    /// Implementations that cannot track some kinds (system headers, say)
    /// may always report [`SourceStatus::NotModified`] for them.
    fn source_status(&self, kind: RefKind, path: &Path, since: SystemTime) -> SourceStatus;

    /// Hash of the compiler path and invocation arguments. Guards the
    /// persisted knowledge base.
    fn settings_hash(&self) -> ContentHash;
}

/// An output target declared by a configuration source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredTarget {
    pub name: String,
    /// Entry unit of the target.
    pub path: PathBuf,
}

/// Everything a configuration source declares.
#[derive(Debug, Clone)]
pub struct SourceMap {
    pub files: Vec<PathBuf>,
    pub origin: Origin,
    pub targets: Vec<DeclaredTarget>,
}

/// Loads configuration sources.
pub trait Resolver: Send + Sync {
    /// Load a config file, or the directory containing one. Without a config
    /// file, implementations fall back to listing source-like files and
    /// treating every subdirectory as a prefix candidate.
    fn load_map(&self, path: &Path) -> Result<SourceMap, ConfigError>;

    /// Has the configuration behind `origin` changed since `since`?
    fn detect_change(&self, origin: &Origin, since: SystemTime) -> bool;
}

/// Explicit context for one build invocation.
#[derive(Clone, Copy)]
pub struct BuildSession<'a> {
    pub compiler: &'a dyn Compiler,
    pub resolver: &'a dyn Resolver,
    /// Becomes the knowledge base's last-modify time once staleness has been
    /// checked.
    pub started: SystemTime,
}

impl<'a> BuildSession<'a> {
    /// Start a session now.
    pub fn new(compiler: &'a dyn Compiler, resolver: &'a dyn Resolver) -> Self {
        Self::at(compiler, resolver, SystemTime::now())
    }

    pub fn at(compiler: &'a dyn Compiler, resolver: &'a dyn Resolver, started: SystemTime) -> Self {
        Self {
            compiler,
            resolver,
            started,
        }
    }
}

impl std::fmt::Debug for BuildSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildSession")
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
