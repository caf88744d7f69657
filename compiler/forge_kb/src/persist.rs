//! Saving and restoring the knowledge base.
//!
//! # File Layout
//!
//! One bincode blob per build directory:
//!
//! ```text
//! Envelope {
//!     format,          // FORMAT_VERSION
//!     settings_hash,   // Compiler::settings_hash() at save time
//!     snapshot,        // bincode-encoded Snapshot
//! }
//! ```
//!
//! Handles are not stored: sources name their origin by config path and
//! get fresh handles on import.
//!
//! A database that cannot be read, was written by another format version,
//! or was written under different compiler settings is discarded whole.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{KnowledgeBase, Put};
use crate::hash::ContentHash;
use crate::origin::Origin;
use crate::reference::{RefKind, Reference};
use crate::source::{SourceDef, SourceState};
use crate::toolchain::DeclaredTarget;

/// Bumped whenever [`Snapshot`] changes shape.
pub const FORMAT_VERSION: u32 = 1;

/// Error while exporting or importing the knowledge base.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("database I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode database: {0}")]
    Encode(#[from] bincode::Error),

    #[error("database is inconsistent: {0}")]
    Corrupt(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: u32,
    settings_hash: ContentHash,
    snapshot: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    origins: Vec<Origin>,
    sources: Vec<SourceRecord>,
    targets: Vec<DeclaredTarget>,
    last_modify: SystemTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct SourceRecord {
    path: PathBuf,
    kind: RefKind,
    name: String,
    /// Config path of the owning origin.
    origin: Option<PathBuf>,
    required: Vec<Reference>,
    exported: Vec<Reference>,
    interface_path: PathBuf,
    object_path: PathBuf,
    needs_rescan: bool,
    needs_recompile: bool,
}

impl KnowledgeBase {
    /// Serialize everything the knowledge base knows.
    pub fn export(&self) -> Result<Vec<u8>, PersistError> {
        let sources = self
            .sources()
            .map(|(_, source)| {
                let def = source.def();
                let state = source.state();
                SourceRecord {
                    path: def.path.clone(),
                    kind: def.kind,
                    name: def.name.clone(),
                    origin: def
                        .origin
                        .and_then(|id| self.origin(id))
                        .map(|o| o.config_path.clone()),
                    required: def.required.clone(),
                    exported: def.exported.clone(),
                    interface_path: state.interface_path,
                    object_path: state.object_path,
                    needs_rescan: state.needs_rescan,
                    needs_recompile: state.needs_recompile,
                }
            })
            .collect();

        let snapshot = Snapshot {
            origins: self.origins().map(|(_, o)| o.clone()).collect(),
            sources,
            targets: self.declared_targets().to_vec(),
            last_modify: self.last_modify,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Rebuild a knowledge base from [`KnowledgeBase::export`] output.
    pub fn import(bytes: &[u8]) -> Result<Self, PersistError> {
        let snapshot: Snapshot = bincode::deserialize(bytes)?;
        let mut kb = Self::new();

        for origin in snapshot.origins {
            kb.register_origin(origin);
        }
        for record in snapshot.sources {
            let origin = match &record.origin {
                Some(config) => Some(kb.find_origin(config).ok_or_else(|| {
                    PersistError::Corrupt(format!(
                        "{} belongs to unknown origin {}",
                        record.path.display(),
                        config.display()
                    ))
                })?),
                None => None,
            };
            let def = SourceDef {
                path: record.path,
                kind: record.kind,
                name: record.name,
                origin,
                required: record.required,
                exported: record.exported,
            };
            let state = SourceState {
                interface_path: record.interface_path,
                object_path: record.object_path,
                needs_rescan: record.needs_rescan,
                needs_recompile: record.needs_recompile,
            };
            match kb.insert(def, state) {
                Ok(Put::Inserted(_)) => {}
                Ok(Put::Existing(id)) => {
                    return Err(PersistError::Corrupt(format!("{id} stored twice")));
                }
                Err(e) => return Err(PersistError::Corrupt(e.to_string())),
            }
        }
        kb.add_declared_targets(snapshot.targets);
        kb.last_modify = snapshot.last_modify;
        kb.mark_clean();
        Ok(kb)
    }
}

/// Write the knowledge base to `path` and mark it clean.
///
/// Writes a sibling temporary file first and renames it over `path`.
pub fn save(path: &Path, settings_hash: ContentHash, kb: &KnowledgeBase) -> Result<(), PersistError> {
    let envelope = Envelope {
        format: FORMAT_VERSION,
        settings_hash,
        snapshot: kb.export()?,
    };
    let bytes = bincode::serialize(&envelope)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| PersistError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes).map_err(|source| PersistError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    kb.mark_clean();
    tracing::debug!(path = %path.display(), bytes = bytes.len(), sources = kb.len(), "saved knowledge base");
    Ok(())
}

/// Read the knowledge base saved at `path`.
///
/// Never fails: anything unusable yields an empty knowledge base.
pub fn load(path: &Path, settings_hash: ContentHash) -> KnowledgeBase {
    match try_load(path, settings_hash) {
        Ok(kb) => {
            tracing::debug!(path = %path.display(), sources = kb.len(), "loaded knowledge base");
            kb
        }
        Err(reason) => {
            tracing::info!(path = %path.display(), "starting with an empty knowledge base: {reason}");
            KnowledgeBase::new()
        }
    }
}

fn try_load(path: &Path, settings_hash: ContentHash) -> Result<KnowledgeBase, String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err("no database".to_owned()),
        Err(e) => return Err(format!("cannot read database: {e}")),
    };
    let envelope: Envelope =
        bincode::deserialize(&bytes).map_err(|e| format!("cannot decode database: {e}"))?;
    if envelope.format != FORMAT_VERSION {
        return Err(format!(
            "format version {} (expected {FORMAT_VERSION})",
            envelope.format
        ));
    }
    if envelope.settings_hash != settings_hash {
        return Err(format!(
            "compiler settings changed ({} -> {settings_hash})",
            envelope.settings_hash
        ));
    }
    KnowledgeBase::import(&envelope.snapshot).map_err(|e| e.to_string())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
