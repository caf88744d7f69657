//! Resolving unknown imports by loading more configuration sources.
//!
//! Discovery is a breadth-first walk over configuration directories. Each
//! unresolved name is matched against the prefix maps of every known
//! origin; matching directories are loaded one at a time, their files are
//! scanned, and the scan results may both satisfy old references and add
//! new ones. The walk ends when everything resolves or no unexplored
//! directory is left.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::db::KnowledgeBase;
use crate::error::KnowledgeResult;
use crate::origin::OriginId;
use crate::reference::{merge_sorted, RefKind, Reference};
use crate::source::{SourceDef, SourceState};
use crate::toolchain::{BuildSession, ScanOutput};

impl KnowledgeBase {
    /// Search configuration sources until every reference resolves or the
    /// search space is exhausted.
    ///
    /// Returns what is still unresolved. Those references are logged but
    /// never fatal. A configuration source that fails to load is.
    pub fn run_discovery(
        &mut self,
        session: &BuildSession<'_>,
        unsatisfied: Vec<Reference>,
    ) -> KnowledgeResult<Vec<Reference>> {
        let mut pending = Vec::new();
        merge_sorted(&mut pending, unsatisfied);

        let mut explored: FxHashSet<PathBuf> = FxHashSet::default();
        let mut queued: FxHashSet<PathBuf> = FxHashSet::default();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();

        loop {
            pending.retain(|reference| !self.resolves(reference));
            if pending.is_empty() {
                break;
            }

            for reference in pending.iter().filter(|r| !r.is_header()) {
                for (_, origin) in self.origins() {
                    for dir in origin.candidate_directories(&reference.name) {
                        if !explored.contains(dir) && queued.insert(dir.to_path_buf()) {
                            tracing::trace!(%reference, dir = %dir.display(), "queue");
                            queue.push_back(dir.to_path_buf());
                        }
                    }
                }
            }

            let Some(dir) = queue.pop_front() else {
                break;
            };
            queued.remove(&dir);
            explored.insert(dir.clone());

            let found = self.add_directory(session, &dir)?;
            merge_sorted(&mut pending, found);
        }

        for reference in &pending {
            tracing::warn!(%reference, "unresolved reference");
        }
        Ok(pending)
    }

    /// Load one configuration source and ingest every file it declares that
    /// is not known yet.
    ///
    /// Returns the references the new files could not resolve.
    pub fn add_directory(
        &mut self,
        session: &BuildSession<'_>,
        path: &Path,
    ) -> KnowledgeResult<Vec<Reference>> {
        let map = session.resolver.load_map(path)?;
        tracing::debug!(
            dir = %path.display(),
            files = map.files.len(),
            targets = map.targets.len(),
            "loaded source map"
        );

        let origin = self.register_origin(map.origin);
        self.add_declared_targets(map.targets);

        let mut unsatisfied = Vec::new();
        for file in &map.files {
            if self.find_path(file).is_some() {
                continue;
            }
            match self.rescan_file(session, file, Some(origin)) {
                Ok(found) => merge_sorted(&mut unsatisfied, found),
                Err(e) => tracing::warn!(path = %file.display(), "skipping: {e}"),
            }
        }
        // Later files may define what earlier ones imported.
        unsatisfied.retain(|reference| !self.resolves(reference));
        Ok(unsatisfied)
    }

    /// Forget whatever is known about `path` and scan it again.
    ///
    /// A failed scan still registers what was recovered and flags the unit
    /// for another scan. A scan that redefines a module another file already
    /// owns fails with [`KnowledgeError::DuplicateModule`], but the file stays
    /// registered as a plain unit flagged for rescan. Header references get
    /// placeholder units so they always resolve. Returns the other references
    /// that do not resolve, sorted.
    ///
    /// [`KnowledgeError::DuplicateModule`]: crate::error::KnowledgeError::DuplicateModule
    pub fn rescan_file(
        &mut self,
        session: &BuildSession<'_>,
        path: &Path,
        origin: Option<OriginId>,
    ) -> KnowledgeResult<Vec<Reference>> {
        self.erase(path);

        let origin_rec = origin.and_then(|id| self.origin(id));
        let (scan, partial) = match session.compiler.scan(origin_rec, path) {
            Ok(scan) => (scan, false),
            Err(failure) => {
                tracing::warn!("{failure}");
                let scan = failure.partial.unwrap_or_else(|| ScanOutput {
                    name: path.display().to_string(),
                    kind: RefKind::Source,
                    required: Vec::new(),
                    exported: Vec::new(),
                });
                (scan, true)
            }
        };

        let mut required = Vec::new();
        merge_sorted(&mut required, scan.required);
        let mut exported = Vec::new();
        merge_sorted(&mut exported, scan.exported);
        merge_sorted(&mut required, exported.iter().cloned());

        let def = SourceDef {
            path: path.to_path_buf(),
            kind: scan.kind,
            name: scan.name,
            origin,
            required,
            exported,
        };
        let required = def.required.clone();
        let state = SourceState {
            needs_rescan: partial,
            needs_recompile: true,
            ..SourceState::default()
        };
        if let Err(err) = self.insert(def, state) {
            // Keep the file known so the next staleness pass retries it.
            self.insert(unscanned(path, origin), retry_state())?;
            return Err(err);
        }

        let mut unsatisfied = Vec::new();
        for reference in required {
            if self.resolves(&reference) {
                continue;
            }
            if reference.is_header() {
                self.put_header(&reference, origin)?;
            } else {
                unsatisfied.push(reference);
            }
        }
        Ok(unsatisfied)
    }

    /// Recreate placeholders for header references that lost theirs, for
    /// example when the origin that owned the placeholder was dropped. The
    /// new placeholder belongs to the origin of the first importer found.
    ///
    /// Returns how many placeholders were created.
    pub(crate) fn restore_header_placeholders(&mut self) -> KnowledgeResult<usize> {
        let mut missing: Vec<(Reference, Option<OriginId>)> = Vec::new();
        for (_, source) in self.sources() {
            for reference in source.required() {
                if reference.is_header()
                    && !self.resolves(reference)
                    && !missing.iter().any(|(known, _)| known == reference)
                {
                    missing.push((reference.clone(), source.origin()));
                }
            }
        }

        for (reference, origin) in &missing {
            tracing::debug!(%reference, "restoring header placeholder");
            self.put_header(reference, *origin)?;
        }
        Ok(missing.len())
    }

    /// Header units are never scanned; the resolved name doubles as path.
    fn put_header(&mut self, reference: &Reference, origin: Option<OriginId>) -> KnowledgeResult<()> {
        let mut header = SourceDef::new(
            PathBuf::from(&reference.name),
            reference.kind,
            reference.name.clone(),
        );
        header.origin = origin;
        self.put(header)?;
        Ok(())
    }
}

/// Stand-in for a file whose scan could not be stored.
fn unscanned(path: &Path, origin: Option<OriginId>) -> SourceDef {
    let mut def = SourceDef::new(path, RefKind::Source, path.display().to_string());
    def.origin = origin;
    def
}

fn retry_state() -> SourceState {
    SourceState {
        needs_rescan: true,
        needs_recompile: true,
        ..SourceState::default()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
