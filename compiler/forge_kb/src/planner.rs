//! Turning the knowledge base into a build plan.

use std::collections::VecDeque;
use std::path::PathBuf;

use forge_plan::{BuildPlan, TargetId};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::action::{CompileAction, LinkStep};
use crate::db::KnowledgeBase;
use crate::error::{KnowledgeError, KnowledgeResult};
use crate::reference::{RefKind, Reference};
use crate::source::{Source, SourceId};

/// What a link step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    #[default]
    Executable,
    StaticLibrary,
    /// Not supported; requesting one fails plan construction.
    SharedLibrary,
}

/// What to do with a reference that resolves to nothing while planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedPolicy {
    /// Log an error and leave the edge out; build whatever resolves.
    #[default]
    BestEffort,
    /// Fail plan construction.
    Strict,
}

/// One requested output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub name: String,
    pub entry: SourceId,
    pub output: PathBuf,
    pub kind: OutputKind,
}

impl LinkRequest {
    pub fn new(name: impl Into<String>, entry: SourceId, output: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            entry,
            output: output.into(),
            kind: OutputKind::Executable,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: OutputKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Builds a plan, creating at most one compile target per source.
struct Planner<'kb> {
    kb: &'kb KnowledgeBase,
    policy: UnresolvedPolicy,
    plan: BuildPlan<CompileAction>,
    compile_targets: FxHashMap<SourceId, TargetId>,
    worklist: VecDeque<SourceId>,
}

impl Planner<'_> {
    fn compile_target(&mut self, id: SourceId, source: &Source) -> TargetId {
        if let Some(&target) = self.compile_targets.get(&id) {
            return target;
        }
        let target = self.plan.create_target(
            CompileAction::Compile(id),
            source.path().display().to_string(),
        );
        self.compile_targets.insert(id, target);
        self.worklist.push_back(id);
        target
    }

    fn add_link(&mut self, request: &LinkRequest) -> KnowledgeResult<()> {
        if request.kind == OutputKind::SharedLibrary {
            return Err(KnowledgeError::Unsupported(format!(
                "shared library output for target '{}'",
                request.name
            )));
        }
        let kb = self.kb;
        let policy = self.policy;
        let closure = kb.dependency_closure(request.entry, &mut |r, s| unresolved(policy, r, s))?;

        let mut inputs = Vec::new();
        let mut compiles = Vec::new();
        for id in closure {
            let source = kb.get(id)?;
            if !source.kind().produces_object() {
                continue;
            }
            inputs.push(id);
            if source.is_stale() {
                compiles.push(self.compile_target(id, source));
            }
        }

        let link = self.plan.create_target(
            CompileAction::Link(LinkStep {
                inputs,
                output: request.output.clone(),
                kind: request.kind,
            }),
            format!("link {}", request.name),
        );
        for target in compiles {
            self.plan.add_dependency(link, target);
        }
        Ok(())
    }

    /// Give every compile target an edge to each stale interface it can see.
    fn expand(&mut self) -> KnowledgeResult<()> {
        let kb = self.kb;
        while let Some(id) = self.worklist.pop_front() {
            let target = self.compile_targets[&id];
            let policy = self.policy;
            let visible = kb.bmi_closure(id, &mut |r, s| unresolved(policy, r, s))?;
            for dep in visible {
                let source = kb.get(dep)?;
                if !source.kind().produces_interface() || !source.is_stale() {
                    continue;
                }
                let dep_target = self.compile_target(dep, source);
                self.plan.add_dependency(target, dep_target);
            }
        }
        Ok(())
    }
}

fn unresolved(policy: UnresolvedPolicy, reference: &Reference, from: &Source) -> KnowledgeResult<()> {
    match policy {
        UnresolvedPolicy::Strict => Err(KnowledgeError::Unresolved {
            reference: reference.clone(),
            from: from.path().to_path_buf(),
        }),
        UnresolvedPolicy::BestEffort => {
            tracing::error!(%reference, from = %from.path().display(), "unresolved reference, dependency left out");
            Ok(())
        }
    }
}

impl KnowledgeBase {
    /// Build a plan producing every requested output.
    ///
    /// Each stale object-producing unit in a request's dependency closure
    /// gets one compile target, shared across requests, and the link target
    /// waits for all of them. Every compile target then waits for the stale
    /// interfaces visible to it, including those only reachable through
    /// re-exports.
    pub fn create_build_plan(
        &self,
        requests: &[LinkRequest],
        policy: UnresolvedPolicy,
    ) -> KnowledgeResult<BuildPlan<CompileAction>> {
        let mut planner = Planner {
            kb: self,
            policy,
            plan: BuildPlan::new(),
            compile_targets: FxHashMap::default(),
            worklist: VecDeque::new(),
        };
        for request in requests {
            planner.add_link(request)?;
        }
        planner.expand()?;

        tracing::debug!(
            targets = planner.plan.len(),
            compiles = planner.compile_targets.len(),
            links = requests.len(),
            "build plan"
        );
        Ok(planner.plan)
    }

    /// Everything `entry` needs to be linked: the entry itself plus, breadth
    /// first, every unit its required references resolve to. An interface
    /// reference also pulls in every implementation unit of that module.
    pub(crate) fn dependency_closure(
        &self,
        entry: SourceId,
        on_unresolved: &mut dyn FnMut(&Reference, &Source) -> KnowledgeResult<()>,
    ) -> KnowledgeResult<Vec<SourceId>> {
        let mut seen: FxHashSet<SourceId> = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        let entry_source = self.get(entry)?;
        seen.insert(entry);
        queue.push_back(entry);
        if entry_source.kind() == RefKind::Interface {
            let impls = Reference::implementation(entry_source.name());
            queue.extend(self.find_multi(&impls).iter().filter(|&&id| seen.insert(id)));
        }

        while let Some(id) = queue.pop_front() {
            order.push(id);
            let source = self.get(id)?;
            for reference in source.required() {
                let found = self.find_multi(reference);
                if found.is_empty() {
                    on_unresolved(reference, source)?;
                    continue;
                }
                queue.extend(found.iter().filter(|&&dep| seen.insert(dep)));
                if reference.kind == RefKind::Interface {
                    let impls = Reference::implementation(reference.name.clone());
                    queue.extend(self.find_multi(&impls).iter().filter(|&&dep| seen.insert(dep)));
                }
            }
        }
        Ok(order)
    }

    /// Every unit whose interface must be available to compile `id`.
    ///
    /// Breadth first over the required and exported references of every
    /// visited unit, since an imported module may re-export further
    /// modules. `id` itself is not included.
    pub(crate) fn bmi_closure(
        &self,
        id: SourceId,
        on_unresolved: &mut dyn FnMut(&Reference, &Source) -> KnowledgeResult<()>,
    ) -> KnowledgeResult<Vec<SourceId>> {
        let mut seen: FxHashSet<SourceId> = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        seen.insert(id);
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            if current != id {
                order.push(current);
            }
            let source = self.get(current)?;
            for reference in source.required().iter().chain(source.exported()) {
                if reference.kind == RefKind::Implementation {
                    continue;
                }
                let found = self.find_multi(reference);
                if found.is_empty() {
                    on_unresolved(reference, source)?;
                    continue;
                }
                queue.extend(found.iter().filter(|&&dep| seen.insert(dep)));
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
