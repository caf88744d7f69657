//! Error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::reference::Reference;
use crate::source::SourceId;
use crate::toolchain::ScanOutput;

/// Errors surfaced by knowledge-base operations.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// A configuration source could not be loaded. Not recoverable locally.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A second definition for a reference that allows only one.
    #[error("{reference} is already defined by {} (redefined by {})", existing.display(), path.display())]
    DuplicateModule {
        reference: Reference,
        existing: PathBuf,
        path: PathBuf,
    },

    /// A reference needed by the build plan resolves to nothing.
    #[error("unresolved {reference} required by {}", from.display())]
    Unresolved { reference: Reference, from: PathBuf },

    /// The request cannot be served by this engine.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A handle that does not name a live source.
    #[error("unknown source {0}")]
    UnknownSource(SourceId),
}

/// A resolver could not load a configuration source.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration '{}': {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// An external tool reported failure.
#[derive(Debug, Clone, Error)]
#[error("tool exited with status {status}: {message}")]
pub struct ToolError {
    pub status: i32,
    pub message: String,
}

impl ToolError {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// The compiler could not fully scan a file.
///
/// Whatever was recovered is still registered; the unit is flagged for
/// rescan on the next staleness pass.
#[derive(Debug, Clone, Error)]
#[error("failed to scan '{}': {message}", path.display())]
pub struct ScanFailure {
    pub path: PathBuf,
    pub message: String,
    pub partial: Option<ScanOutput>,
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;
