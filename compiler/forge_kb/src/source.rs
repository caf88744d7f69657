//! Discovered compile units.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::origin::OriginId;
use crate::reference::{RefKind, Reference};

/// Handle to a [`Source`] stored in a knowledge base.
///
/// Stable for the lifetime of one in-memory knowledge base; erased slots are
/// never reused. Handles are not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) usize);

impl SourceId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// The immutable description of a unit, as produced by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDef {
    pub path: PathBuf,
    pub kind: RefKind,
    pub name: String,
    pub origin: Option<OriginId>,
    /// Every reference the unit imports, sorted.
    pub required: Vec<Reference>,
    /// The subset of `required` that is re-exported to importers, sorted.
    pub exported: Vec<Reference>,
}

impl SourceDef {
    pub fn new(path: impl Into<PathBuf>, kind: RefKind, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            name: name.into(),
            origin: None,
            required: Vec::new(),
            exported: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: OriginId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Add an import.
    #[must_use]
    pub fn requires(mut self, reference: Reference) -> Self {
        if let Err(pos) = self.required.binary_search(&reference) {
            self.required.insert(pos, reference);
        }
        self
    }

    /// Add an import that is also re-exported.
    #[must_use]
    pub fn reexports(mut self, reference: Reference) -> Self {
        if let Err(pos) = self.exported.binary_search(&reference) {
            self.exported.insert(pos, reference.clone());
        }
        self.requires(reference)
    }

    /// The key this unit is indexed under.
    #[must_use]
    pub fn reference(&self) -> Reference {
        Reference::new(self.kind, self.name.clone())
    }
}

/// Outputs and flags that change after a unit is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceState {
    /// Empty until built. Only meaningful for interface-producing kinds.
    pub interface_path: PathBuf,
    /// Empty until built. Only meaningful for object-producing kinds.
    pub object_path: PathBuf,
    pub needs_rescan: bool,
    pub needs_recompile: bool,
}

/// A unit stored in the knowledge base.
///
/// The definition is fixed once stored; the [`SourceState`] sits behind its
/// own lock so a compile action can publish artifacts through a shared
/// reference to the knowledge base.
#[derive(Debug)]
pub struct Source {
    def: SourceDef,
    state: RwLock<SourceState>,
}

impl Source {
    pub(crate) fn new(def: SourceDef, state: SourceState) -> Self {
        Self {
            def,
            state: RwLock::new(state),
        }
    }

    #[must_use]
    pub fn def(&self) -> &SourceDef {
        &self.def
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.def.path
    }

    #[must_use]
    pub fn kind(&self) -> RefKind {
        self.def.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    #[must_use]
    pub fn origin(&self) -> Option<OriginId> {
        self.def.origin
    }

    #[must_use]
    pub fn required(&self) -> &[Reference] {
        &self.def.required
    }

    #[must_use]
    pub fn exported(&self) -> &[Reference] {
        &self.def.exported
    }

    #[must_use]
    pub fn reference(&self) -> Reference {
        self.def.reference()
    }

    /// Snapshot of the mutable state.
    #[must_use]
    pub fn state(&self) -> SourceState {
        self.state.read().clone()
    }

    #[must_use]
    pub fn interface_path(&self) -> PathBuf {
        self.state.read().interface_path.clone()
    }

    #[must_use]
    pub fn object_path(&self) -> PathBuf {
        self.state.read().object_path.clone()
    }

    #[must_use]
    pub fn needs_recompile(&self) -> bool {
        self.state.read().needs_recompile
    }

    #[must_use]
    pub fn needs_rescan(&self) -> bool {
        self.state.read().needs_rescan
    }

    /// True if some artifact this kind should produce has not been built.
    #[must_use]
    pub fn missing_artifacts(&self) -> bool {
        let state = self.state.read();
        (self.def.kind.produces_interface() && state.interface_path.as_os_str().is_empty())
            || (self.def.kind.produces_object() && state.object_path.as_os_str().is_empty())
    }

    /// True if the unit has to be compiled before its outputs can be used.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.needs_recompile() || self.missing_artifacts()
    }

    /// Set `needs_recompile`. Returns true if the flag changed.
    pub(crate) fn flag_recompile(&self) -> bool {
        let mut state = self.state.write();
        !std::mem::replace(&mut state.needs_recompile, true)
    }

    /// Publish fresh artifacts and clear `needs_recompile`.
    pub(crate) fn publish(&self, interface_path: PathBuf, object_path: PathBuf) {
        let mut state = self.state.write();
        state.interface_path = interface_path;
        state.object_path = object_path;
        state.needs_recompile = false;
    }
}
