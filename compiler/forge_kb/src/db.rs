//! The knowledge base: every known unit, indexed by path and by reference.
//!
//! Sources and origins live in arenas addressed by [`SourceId`] and
//! [`OriginId`]. The three indices (file, module, origin) only store handles
//! and are kept mutually consistent by every mutation in this module.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use rustc_hash::FxHashMap;

use crate::error::{KnowledgeError, KnowledgeResult};
use crate::origin::{Origin, OriginId};
use crate::reference::Reference;
use crate::source::{Source, SourceDef, SourceId, SourceState};
use crate::toolchain::{ArtifactPaths, DeclaredTarget};

/// Result of [`KnowledgeBase::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Put {
    /// The path was unseen and is now stored.
    Inserted(SourceId),
    /// The path is already known; nothing changed. Erase first to replace.
    Existing(SourceId),
}

impl Put {
    #[must_use]
    pub fn id(self) -> SourceId {
        match self {
            Self::Inserted(id) | Self::Existing(id) => id,
        }
    }
}

/// Index of discovered units, their origins, and declared targets.
#[derive(Debug)]
pub struct KnowledgeBase {
    sources: Vec<Option<Source>>,
    origins: Vec<Option<Origin>>,
    files: FxHashMap<PathBuf, SourceId>,
    modules: FxHashMap<Reference, Vec<SourceId>>,
    origin_index: FxHashMap<PathBuf, OriginId>,
    targets: Vec<DeclaredTarget>,
    pub(crate) last_modify: SystemTime,
    dirty: AtomicBool,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            origins: Vec::new(),
            files: FxHashMap::default(),
            modules: FxHashMap::default(),
            origin_index: FxHashMap::default(),
            targets: Vec::new(),
            last_modify: SystemTime::UNIX_EPOCH,
            dirty: AtomicBool::new(false),
        }
    }
}

impl KnowledgeBase {
    /// Create an empty knowledge base.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Time of the last completed staleness check.
    #[must_use]
    pub fn last_modify(&self) -> SystemTime {
        self.last_modify
    }

    // Lookup

    #[must_use]
    pub fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn get(&self, id: SourceId) -> KnowledgeResult<&Source> {
        self.source(id).ok_or(KnowledgeError::UnknownSource(id))
    }

    /// Live sources in insertion order.
    pub fn sources(&self) -> impl Iterator<Item = (SourceId, &Source)> {
        self.sources
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|s| (SourceId(idx), s)))
    }

    #[must_use]
    pub fn origin(&self, id: OriginId) -> Option<&Origin> {
        self.origins.get(id.0).and_then(Option::as_ref)
    }

    /// Live origins in registration order.
    pub fn origins(&self) -> impl Iterator<Item = (OriginId, &Origin)> {
        self.origins
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|o| (OriginId(idx), o)))
    }

    #[must_use]
    pub fn find_origin(&self, config_path: &Path) -> Option<OriginId> {
        self.origin_index.get(config_path).copied()
    }

    /// First source registered under `reference`.
    #[must_use]
    pub fn find(&self, reference: &Reference) -> Option<SourceId> {
        self.find_multi(reference).first().copied()
    }

    /// The source stored for exactly this path.
    #[must_use]
    pub fn find_path(&self, path: &Path) -> Option<SourceId> {
        self.files.get(path).copied()
    }

    /// Every source registered under `reference`, first inserted first.
    #[must_use]
    pub fn find_multi(&self, reference: &Reference) -> &[SourceId] {
        self.modules.get(reference).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn resolves(&self, reference: &Reference) -> bool {
        self.modules.contains_key(reference)
    }

    /// Targets declared by every loaded configuration source.
    #[must_use]
    pub fn declared_targets(&self) -> &[DeclaredTarget] {
        &self.targets
    }

    // Mutation

    /// Store a freshly scanned unit.
    ///
    /// A known path is a conflict: the existing handle is returned and
    /// nothing changes. A second definition of a reference whose kind allows
    /// only one is rejected.
    pub fn put(&mut self, def: SourceDef) -> KnowledgeResult<Put> {
        let state = SourceState {
            needs_recompile: true,
            ..SourceState::default()
        };
        self.insert(def, state)
    }

    pub(crate) fn insert(&mut self, def: SourceDef, state: SourceState) -> KnowledgeResult<Put> {
        if let Some(&id) = self.files.get(&def.path) {
            return Ok(Put::Existing(id));
        }
        if let Some(origin) = def.origin {
            debug_assert!(
                self.origin(origin).is_some(),
                "source {} carries an unregistered {origin}",
                def.path.display()
            );
        }

        let reference = def.reference();
        if !reference.kind.allows_multiple() {
            if let Some(existing) = self.find(&reference).and_then(|id| self.source(id)) {
                return Err(KnowledgeError::DuplicateModule {
                    reference,
                    existing: existing.path().to_path_buf(),
                    path: def.path,
                });
            }
        }

        let id = SourceId(self.sources.len());
        tracing::trace!(source = %id, path = %def.path.display(), %reference, "insert");
        self.files.insert(def.path.clone(), id);
        self.modules.entry(reference).or_default().push(id);
        self.sources.push(Some(Source::new(def, state)));
        self.mark_dirty();
        Ok(Put::Inserted(id))
    }

    /// Remove the source stored for `path` from every index.
    pub fn erase(&mut self, path: &Path) -> Option<SourceId> {
        let id = self.files.remove(path)?;
        let source = self.sources.get_mut(id.0).and_then(Option::take)?;
        let reference = source.reference();
        if let Some(bucket) = self.modules.get_mut(&reference) {
            bucket.retain(|&other| other != id);
            if bucket.is_empty() {
                self.modules.remove(&reference);
            }
        }
        tracing::trace!(source = %id, path = %path.display(), "erase");
        self.mark_dirty();
        Some(id)
    }

    /// Insert an origin, or merge it into the one with the same config path.
    ///
    /// Equal settings keep the existing record and pick up any prefix maps
    /// it did not have yet. Different settings replace the record in place,
    /// so sources keep pointing at a valid handle, and flag every source it
    /// owns for recompilation.
    pub fn register_origin(&mut self, origin: Origin) -> OriginId {
        let Some(&id) = self.origin_index.get(&origin.config_path) else {
            let id = OriginId(self.origins.len());
            tracing::debug!(origin = %id, config = %origin.config_path.display(), "register origin");
            self.origin_index.insert(origin.config_path.clone(), id);
            self.origins.push(Some(origin));
            self.mark_dirty();
            return id;
        };

        let Some(existing) = self.origins.get_mut(id.0).and_then(Option::as_mut) else {
            return id;
        };
        if existing.settings_hash == origin.settings_hash {
            let mut merged = false;
            for map in origin.prefix_maps {
                if !existing.prefix_maps.contains(&map) {
                    existing.prefix_maps.push(map);
                    merged = true;
                }
            }
            if merged {
                self.mark_dirty();
            }
            return id;
        }

        *existing = origin;
        let mut flagged = 0usize;
        for (_, source) in self.sources() {
            if source.origin() == Some(id) && source.flag_recompile() {
                flagged += 1;
            }
        }
        tracing::debug!(origin = %id, flagged, "origin settings changed, replacing");
        self.mark_dirty();
        id
    }

    /// Remove an origin and every source that belongs to it.
    ///
    /// Returns the number of sources removed.
    pub fn drop_origin(&mut self, id: OriginId) -> usize {
        let Some(origin) = self.origins.get_mut(id.0).and_then(Option::take) else {
            return 0;
        };
        self.origin_index.remove(&origin.config_path);

        let doomed: Vec<PathBuf> = self
            .sources()
            .filter(|(_, s)| s.origin() == Some(id))
            .map(|(_, s)| s.path().to_path_buf())
            .collect();
        for path in &doomed {
            self.erase(path);
        }
        tracing::debug!(origin = %id, config = %origin.config_path.display(), sources = doomed.len(), "dropped origin");
        self.mark_dirty();
        doomed.len()
    }

    /// Remember targets declared by a configuration source. A later
    /// declaration with the same name wins.
    pub fn add_declared_targets(&mut self, targets: impl IntoIterator<Item = DeclaredTarget>) {
        for target in targets {
            match self.targets.iter_mut().find(|t| t.name == target.name) {
                Some(slot) if *slot == target => continue,
                Some(slot) => *slot = target,
                None => self.targets.push(target),
            }
            self.mark_dirty();
        }
    }

    /// Publish the outputs of a successful compilation.
    ///
    /// Takes `&self`: each source is written by at most one running action.
    pub fn record_artifacts(&self, id: SourceId, paths: ArtifactPaths) -> KnowledgeResult<()> {
        let source = self.get(id)?;
        tracing::trace!(source = %id, interface = %paths.interface.display(), object = %paths.object.display(), "artifacts");
        source.publish(paths.interface, paths.object);
        self.mark_dirty();
        Ok(())
    }

    // Dirty tracking

    /// True if anything changed since the knowledge base was loaded or saved.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub(crate) fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }

    /// Check that the indices agree with the arenas.
    #[cfg(any(test, feature = "testing"))]
    pub fn verify_indices(&self) -> Result<(), String> {
        for (id, source) in self.sources() {
            if self.find_path(source.path()) != Some(id) {
                return Err(format!("{} missing from file index", source.path().display()));
            }
            if !self.find_multi(&source.reference()).contains(&id) {
                return Err(format!("{} missing from module index", source.reference()));
            }
            if let Some(origin) = source.origin() {
                if self.origin(origin).is_none() {
                    return Err(format!("{} points at dropped {origin}", source.path().display()));
                }
            }
        }
        if self.files.len() != self.sources().count() {
            return Err("file index has stale entries".to_owned());
        }
        for (reference, bucket) in &self.modules {
            if bucket.is_empty() {
                return Err(format!("empty bucket for {reference}"));
            }
            if bucket.len() > 1 && !reference.kind.allows_multiple() {
                return Err(format!("{reference} has {} definitions", bucket.len()));
            }
            for &id in bucket {
                if self.source(id).map(Source::reference).as_ref() != Some(reference) {
                    return Err(format!("{reference} points at {id}"));
                }
            }
        }
        for (path, &id) in &self.origin_index {
            if self.origin(id).map(|o| o.config_path.as_path()) != Some(path.as_path()) {
                return Err(format!("origin index entry {} is stale", path.display()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
