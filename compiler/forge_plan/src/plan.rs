//! Generic dependency-leveled target container.

use std::fmt;

/// Handle to a target inside a [`BuildPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(usize);

impl TargetId {
    /// Position of the target in creation order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Readiness of a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetState {
    /// Not yet handed out.
    #[default]
    Waiting,
    /// Handed out, not yet finished.
    Pending,
    /// Finished.
    Done,
}

/// Per-run state vector of a plan.
///
/// Kept separate from the plan so the plan itself can be shared read-only
/// while the state is mutated under a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanState {
    states: Vec<TargetState>,
    done: usize,
}

impl PlanState {
    /// State of one target.
    #[must_use]
    pub fn get(&self, id: TargetId) -> TargetState {
        self.states[id.0]
    }

    /// Number of targets marked done.
    #[must_use]
    pub fn done_count(&self) -> usize {
        self.done
    }

    /// True once every target is done.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.done == self.states.len()
    }
}

#[derive(Debug)]
struct Target<T> {
    payload: T,
    dependencies: Vec<TargetId>,
    name: String,
}

/// A DAG of targets carrying opaque payloads.
///
/// Acyclicity is the caller's responsibility; a cycle simply never becomes
/// ready.
#[derive(Debug)]
pub struct BuildPlan<T> {
    targets: Vec<Target<T>>,
}

impl<T> Default for BuildPlan<T> {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
        }
    }
}

impl<T> BuildPlan<T> {
    /// Create an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target and return its handle.
    pub fn create_target(&mut self, payload: T, name: impl Into<String>) -> TargetId {
        let id = TargetId(self.targets.len());
        self.targets.push(Target {
            payload,
            dependencies: Vec::new(),
            name: name.into(),
        });
        id
    }

    /// Record that `target` may only start once `depends_on` is done.
    ///
    /// Repeated edges are ignored.
    pub fn add_dependency(&mut self, target: TargetId, depends_on: TargetId) {
        debug_assert!(depends_on.0 < self.targets.len(), "unknown target {depends_on}");
        let deps = &mut self.targets[target.0].dependencies;
        if !deps.contains(&depends_on) {
            deps.push(depends_on);
        }
    }

    /// Fresh state with every target waiting.
    #[must_use]
    pub fn initialize_state(&self) -> PlanState {
        PlanState {
            states: vec![TargetState::Waiting; self.targets.len()],
            done: 0,
        }
    }

    /// Offer every ready target to `accept`.
    ///
    /// A target is ready when it is still waiting and all of its
    /// dependencies are done. Targets that `accept` takes become pending;
    /// refused targets stay waiting and are offered again on the next call.
    /// Returns true only when every target is done.
    pub fn prepare_actions<F>(&self, state: &mut PlanState, mut accept: F) -> bool
    where
        F: FnMut(TargetId, &T) -> bool,
    {
        if state.is_complete() {
            return true;
        }

        for (idx, target) in self.targets.iter().enumerate() {
            if state.states[idx] != TargetState::Waiting {
                continue;
            }
            let ready = target
                .dependencies
                .iter()
                .all(|dep| state.states[dep.0] == TargetState::Done);
            if ready && accept(TargetId(idx), &target.payload) {
                state.states[idx] = TargetState::Pending;
            }
        }

        state.is_complete()
    }

    /// Finalize a target.
    pub fn mark_done(&self, state: &mut PlanState, id: TargetId) {
        let slot = &mut state.states[id.0];
        if *slot != TargetState::Done {
            *slot = TargetState::Done;
            state.done += 1;
        }
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True if the plan has no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Payload of a target.
    #[must_use]
    pub fn payload(&self, id: TargetId) -> &T {
        &self.targets[id.0].payload
    }

    /// Display name of a target.
    #[must_use]
    pub fn name(&self, id: TargetId) -> &str {
        &self.targets[id.0].name
    }

    /// Direct dependencies of a target.
    #[must_use]
    pub fn dependencies(&self, id: TargetId) -> &[TargetId] {
        &self.targets[id.0].dependencies
    }

    /// All target handles in creation order.
    pub fn ids(&self) -> impl Iterator<Item = TargetId> {
        (0..self.targets.len()).map(TargetId)
    }

    /// Iterate over `(id, payload)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (TargetId, &T)> {
        self.targets
            .iter()
            .enumerate()
            .map(|(idx, t)| (TargetId(idx), &t.payload))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
