//! Module knowledge base.
//!
//! Tracks every discovered compile unit of a modules-based project, what it
//! imports and re-exports, and where its built artifacts are. From that it
//! answers three questions for the driver:
//!
//! 1. **What changed?** [`KnowledgeBase::check_for_modifications`] and
//!    [`KnowledgeBase::check_for_recompile`]
//! 2. **Where is the module I'm missing?** [`KnowledgeBase::run_discovery`]
//!    walks configuration sources through prefix maps
//! 3. **What has to be built, in which order?**
//!    [`KnowledgeBase::create_build_plan`] emits a
//!    [`forge_plan::BuildPlan`] of [`CompileAction`]s
//!
//! Compiling and config loading are delegated to the [`Compiler`] and
//! [`Resolver`] collaborators, passed in through a [`BuildSession`].

pub mod action;
pub mod db;
pub mod discovery;
pub mod error;
pub mod hash;
pub mod origin;
pub mod persist;
pub mod planner;
pub mod reference;
pub mod source;
pub mod staleness;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod toolchain;

pub use action::{CompileAction, LinkStep};
pub use db::{KnowledgeBase, Put};
pub use error::{ConfigError, KnowledgeError, KnowledgeResult, ScanFailure, ToolError};
pub use hash::{combine_hashes, hash_string, hash_strings, ContentHash};
pub use origin::{match_prefix, Origin, OriginId, PrefixMap};
pub use persist::PersistError;
pub use planner::{LinkRequest, OutputKind, UnresolvedPolicy};
pub use reference::{RefKind, Reference};
pub use source::{Source, SourceDef, SourceId, SourceState};
pub use staleness::ModificationReport;
pub use toolchain::{
    ArtifactPaths, BuildSession, Compiler, DeclaredTarget, ModuleArtifact, Resolver, ScanOutput,
    SourceMap, SourceStatus,
};
