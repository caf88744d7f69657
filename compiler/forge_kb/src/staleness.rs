//! Detecting changed inputs and propagating recompilation.

use std::path::PathBuf;

use crate::db::KnowledgeBase;
use crate::origin::OriginId;
use crate::reference::{merge_sorted, Reference};
use crate::toolchain::{BuildSession, SourceStatus};

/// What [`KnowledgeBase::check_for_modifications`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationReport {
    /// Origins whose configuration changed.
    pub dropped_origins: usize,
    /// Sources removed, either with their origin or because the file is gone.
    pub dropped_sources: usize,
    /// Files that were scanned again.
    pub rescanned: Vec<PathBuf>,
    /// Header units flagged for recompilation.
    pub header_changes: usize,
    /// Header placeholders recreated after their owner was dropped.
    pub restored_headers: usize,
    /// References nothing resolves to, sorted. Feed these to discovery.
    pub unsatisfied: Vec<Reference>,
}

impl ModificationReport {
    /// True if the pass changed nothing.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dropped_origins == 0
            && self.dropped_sources == 0
            && self.rescanned.is_empty()
            && self.header_changes == 0
            && self.restored_headers == 0
    }
}

impl KnowledgeBase {
    /// Bring the knowledge base in line with the filesystem.
    ///
    /// Changed origins are dropped with all their sources. Modified files
    /// are rescanned, except header units, which are only flagged. Missing
    /// files are dropped. Header references left without a placeholder get
    /// a new one. Finally `last_modify` moves to the session start. The
    /// knowledge base is only marked dirty if something changed.
    pub fn check_for_modifications(&mut self, session: &BuildSession<'_>) -> ModificationReport {
        let since = self.last_modify;
        let mut report = ModificationReport::default();

        let changed: Vec<OriginId> = self
            .origins()
            .filter(|(_, origin)| session.resolver.detect_change(origin, since))
            .map(|(id, _)| id)
            .collect();
        for id in changed {
            report.dropped_sources += self.drop_origin(id);
            report.dropped_origins += 1;
        }

        let mut rescan = Vec::new();
        let mut missing = Vec::new();
        for (_, source) in self.sources() {
            let status = session
                .compiler
                .source_status(source.kind(), source.path(), since);
            match status {
                SourceStatus::Missing => missing.push(source.path().to_path_buf()),
                SourceStatus::Modified if source.kind().is_header() => {
                    tracing::debug!(path = %source.path().display(), "header changed");
                    if source.flag_recompile() {
                        report.header_changes += 1;
                    }
                }
                SourceStatus::Modified => {
                    rescan.push((source.path().to_path_buf(), source.origin()));
                }
                SourceStatus::NotModified if source.needs_rescan() => {
                    rescan.push((source.path().to_path_buf(), source.origin()));
                }
                SourceStatus::NotModified => {}
            }
        }
        if report.header_changes > 0 {
            self.mark_dirty();
        }

        for path in missing {
            tracing::debug!(path = %path.display(), "file disappeared");
            if self.erase(&path).is_some() {
                report.dropped_sources += 1;
            }
        }

        // Forget the whole batch first: files may trade module names.
        for (path, _) in &rescan {
            self.erase(path);
        }
        let mut unsatisfied = Vec::new();
        for (path, origin) in rescan {
            match self.rescan_file(session, &path, origin) {
                Ok(found) => merge_sorted(&mut unsatisfied, found),
                Err(e) => tracing::warn!(path = %path.display(), "rescan failed: {e}"),
            }
            report.rescanned.push(path);
        }
        match self.restore_header_placeholders() {
            Ok(restored) => report.restored_headers = restored,
            Err(e) => tracing::warn!("cannot restore header placeholders: {e}"),
        }
        merge_sorted(&mut unsatisfied, self.unsatisfied_references());
        report.unsatisfied = unsatisfied;

        // Not a change by itself: saved only alongside one.
        self.last_modify = session.started;

        tracing::debug!(
            dropped_origins = report.dropped_origins,
            dropped_sources = report.dropped_sources,
            rescanned = report.rescanned.len(),
            unsatisfied = report.unsatisfied.len(),
            "modification check"
        );
        report
    }

    /// Every required reference nothing resolves to, sorted.
    #[must_use]
    pub fn unsatisfied_references(&self) -> Vec<Reference> {
        let mut unsatisfied: Vec<Reference> = self
            .sources()
            .flat_map(|(_, source)| source.required())
            .filter(|reference| !self.resolves(reference))
            .cloned()
            .collect();
        unsatisfied.sort();
        unsatisfied.dedup();
        unsatisfied
    }

    /// Flag every source that has to be rebuilt.
    ///
    /// A source needs a rebuild if an artifact its kind produces is missing,
    /// or if something it requires needs one. Flags only ever go from false
    /// to true, so this reaches a fixed point in at most N passes. Returns
    /// how many flags were set.
    pub fn check_for_recompile(&self) -> usize {
        let mut total = 0;
        loop {
            let mut changed = 0;
            for (_, source) in self.sources() {
                if source.needs_recompile() {
                    continue;
                }
                let must = source.missing_artifacts()
                    || source.required().iter().any(|reference| {
                        self.find_multi(reference)
                            .iter()
                            .filter_map(|&id| self.source(id))
                            .any(|dep| dep.needs_recompile())
                    });
                if must && source.flag_recompile() {
                    tracing::trace!(path = %source.path().display(), "needs recompile");
                    changed += 1;
                }
            }
            if changed == 0 {
                break;
            }
            total += changed;
        }
        if total > 0 {
            self.mark_dirty();
        }
        total
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
