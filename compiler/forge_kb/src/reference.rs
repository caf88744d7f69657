//! Logical unit identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of unit a reference names.
///
/// Declaration order is the sort order of references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RefKind {
    /// Primary module interface unit (`export module m;`).
    Interface,
    /// Module implementation unit (`module m;`).
    Implementation,
    /// Module partition (`export module m:part;`).
    Partition,
    /// Plain translation unit with no module declaration.
    Source,
    /// Header unit found on the system include path.
    SystemHeader,
    /// Header unit found relative to the user include path.
    UserHeader,
}

impl RefKind {
    /// Header units. Their names are resolved paths, not module names.
    #[must_use]
    pub const fn is_header(self) -> bool {
        matches!(self, Self::SystemHeader | Self::UserHeader)
    }

    /// Kinds that may have several physical definitions under one name.
    #[must_use]
    pub const fn allows_multiple(self) -> bool {
        matches!(self, Self::Implementation | Self::Partition)
    }

    /// Kinds whose compilation yields a module interface artifact.
    #[must_use]
    pub const fn produces_interface(self) -> bool {
        matches!(
            self,
            Self::Interface | Self::Partition | Self::SystemHeader | Self::UserHeader
        )
    }

    /// Kinds whose compilation yields an object file for linking.
    #[must_use]
    pub const fn produces_object(self) -> bool {
        matches!(
            self,
            Self::Interface | Self::Implementation | Self::Partition | Self::Source
        )
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interface => "interface",
            Self::Implementation => "implementation",
            Self::Partition => "partition",
            Self::Source => "source",
            Self::SystemHeader => "system-header",
            Self::UserHeader => "user-header",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a unit independent of where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub kind: RefKind,
    pub name: String,
}

impl Reference {
    pub fn new(kind: RefKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(RefKind::Interface, name)
    }

    pub fn implementation(name: impl Into<String>) -> Self {
        Self::new(RefKind::Implementation, name)
    }

    pub fn partition(name: impl Into<String>) -> Self {
        Self::new(RefKind::Partition, name)
    }

    pub fn user_header(path: impl Into<String>) -> Self {
        Self::new(RefKind::UserHeader, path)
    }

    pub fn system_header(path: impl Into<String>) -> Self {
        Self::new(RefKind::SystemHeader, path)
    }

    /// The module part of the name: `m.sub:part` gives `m.sub`.
    #[must_use]
    pub fn module_name(&self) -> &str {
        module_name(&self.name)
    }

    #[must_use]
    pub fn is_header(&self) -> bool {
        self.kind.is_header()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Strip a partition suffix from a module name.
#[must_use]
pub fn module_name(name: &str) -> &str {
    name.split_once(':').map_or(name, |(module, _)| module)
}

/// Sorted union of `more` into `into`.
pub fn merge_sorted(into: &mut Vec<Reference>, more: impl IntoIterator<Item = Reference>) {
    into.extend(more);
    into.sort();
    into.dedup();
}
