//! Build plan payloads.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use rustc_hash::FxHashSet;

use crate::db::KnowledgeBase;
use crate::error::KnowledgeResult;
use crate::planner::OutputKind;
use crate::source::SourceId;
use crate::toolchain::{Compiler, ModuleArtifact};

/// Inputs and output of one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStep {
    /// Object-producing units, in dependency-closure order.
    pub inputs: Vec<SourceId>,
    pub output: PathBuf,
    pub kind: OutputKind,
}

/// What a build plan target does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileAction {
    Compile(SourceId),
    Link(LinkStep),
}

impl CompileAction {
    /// Run the action. Returns true on success.
    ///
    /// Compiler errors and panics are logged and reported as failure, never
    /// propagated.
    pub fn execute(&self, kb: &KnowledgeBase, compiler: &dyn Compiler) -> bool {
        let result = panic::catch_unwind(AssertUnwindSafe(|| match self {
            Self::Compile(id) => compile(kb, compiler, *id),
            Self::Link(step) => link(kb, compiler, step),
        }));
        match result {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                tracing::error!("{e}");
                false
            }
            Err(_) => {
                tracing::error!(action = ?self, "compiler panicked");
                false
            }
        }
    }
}

fn compile(kb: &KnowledgeBase, compiler: &dyn Compiler, id: SourceId) -> KnowledgeResult<bool> {
    let source = kb.get(id)?;
    let origin = source.origin().and_then(|o| kb.origin(o));

    // Unresolved references were already reported while planning.
    let modules: Vec<ModuleArtifact> = kb
        .bmi_closure(id, &mut |_, _| Ok(()))?
        .into_iter()
        .filter_map(|dep| kb.source(dep))
        .filter(|dep| dep.kind().produces_interface())
        .map(|dep| ModuleArtifact {
            reference: dep.reference(),
            source_path: dep.path().to_path_buf(),
            interface_path: dep.interface_path(),
        })
        .collect();

    tracing::debug!(path = %source.path().display(), modules = modules.len(), "compile");
    match compiler.compile(origin, source.def(), &modules) {
        Ok(paths) => {
            kb.record_artifacts(id, paths)?;
            Ok(true)
        }
        Err(e) => {
            tracing::error!(path = %source.path().display(), "compile failed: {e}");
            Ok(false)
        }
    }
}

fn link(kb: &KnowledgeBase, compiler: &dyn Compiler, step: &LinkStep) -> KnowledgeResult<bool> {
    let mut seen = FxHashSet::default();
    let mut objects = Vec::with_capacity(step.inputs.len());
    for &id in &step.inputs {
        let source = kb.get(id)?;
        let object = source.object_path();
        if object.as_os_str().is_empty() {
            tracing::error!(path = %source.path().display(), "no object file to link");
            return Ok(false);
        }
        if seen.insert(object.clone()) {
            objects.push(object);
        } else {
            tracing::warn!(object = %object.display(), "duplicate object in link step");
        }
    }

    tracing::debug!(output = %step.output.display(), objects = objects.len(), "link");
    match compiler.link(&objects, &step.output) {
        Ok(()) => Ok(true),
        Err(e) => {
            tracing::error!(output = %step.output.display(), "link failed: {e}");
            Ok(false)
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
