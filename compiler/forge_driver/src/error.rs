//! Driver errors.

use std::path::PathBuf;

use forge_kb::{KnowledgeError, PersistError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error("failed to save knowledge base: {0}")]
    Persist(#[from] PersistError),

    /// No configuration source declares a target with this name.
    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    #[error("entry '{}' of target '{target}' is not a known source", path.display())]
    UnknownEntry { target: String, path: PathBuf },

    /// The plan ran but did not finish.
    #[error("build failed: {failed} target(s) failed, {not_run} not run")]
    BuildFailed { failed: usize, not_run: usize },
}
