//! Bounded parallel execution of a [`BuildPlan`].
//!
//! One owner loop (running on the calling thread) is the only place that
//! asks the plan for ready targets. Each ready target becomes a job on a
//! fixed-size `rayon` pool; the job reports back over a channel and the owner
//! marks it done and asks again. No continuation recursion, so long chains
//! cannot grow the stack.
//!
//! # Failure policy
//!
//! - **stop** (default): after the first failure nothing new is dispatched,
//!   and jobs already queued see the stopped flag and skip themselves.
//!   Running jobs are not interrupted; their results are discarded.
//! - **keep going**: independent targets keep running. A failed target is
//!   never marked done, so everything downstream of it simply never becomes
//!   ready.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;

use crate::plan::{BuildPlan, PlanState, TargetId};

/// Configuration for the executor.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Number of worker threads (0 = auto-detect).
    pub jobs: usize,
    /// Keep running independent targets after a failure.
    pub keep_going: bool,
}

impl SchedulerConfig {
    /// Create a configuration with the given job count.
    #[must_use]
    pub fn new(jobs: usize) -> Self {
        Self {
            jobs,
            keep_going: false,
        }
    }

    /// Auto-detect the number of CPUs.
    #[must_use]
    pub fn auto() -> Self {
        Self::new(0)
    }

    /// Set the failure policy.
    #[must_use]
    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Get the effective number of jobs.
    #[must_use]
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        } else {
            self.jobs
        }
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every target ran and succeeded.
    Success,
    /// At least one target failed, or the plan could not finish.
    Failure,
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Overall result.
    pub outcome: RunOutcome,
    /// Targets that ran successfully, in completion order.
    pub succeeded: Vec<TargetId>,
    /// Targets whose action reported failure.
    pub failed: Vec<TargetId>,
    /// Targets that were dispatched but skipped because the run had stopped.
    pub skipped: Vec<TargetId>,
    /// Targets that were never dispatched.
    pub not_started: usize,
}

impl RunReport {
    fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            not_started: 0,
        }
    }

    /// True if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }
}

/// State shared between the owner loop and the workers.
struct Shared {
    plan: PlanState,
    stopped: bool,
}

enum Completion {
    Finished { id: TargetId, ok: bool },
    Skipped { id: TargetId },
}

/// Drives build plans on a worker pool.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Get the number of worker threads.
    #[must_use]
    pub fn jobs(&self) -> usize {
        self.config.effective_jobs()
    }

    /// Run every target of `plan`, calling `exec` for each one.
    ///
    /// `exec` returns true on success. It runs on a pool thread with no
    /// scheduler lock held. A panic inside `exec` counts as a failure.
    pub fn run<T, F>(&self, plan: &BuildPlan<T>, exec: F) -> RunReport
    where
        T: Sync,
        F: Fn(TargetId, &T) -> bool + Sync,
    {
        if plan.is_empty() {
            return RunReport::new(RunOutcome::Success);
        }

        let shared = Mutex::new(Shared {
            plan: plan.initialize_state(),
            stopped: false,
        });
        let (tx, rx) = channel::unbounded::<Completion>();

        let work = |id: TargetId| {
            let completion = run_target(plan, &shared, &exec, id);
            // The owner holds the receiver until every dispatched job reports.
            let _ = tx.send(completion);
        };

        let jobs = self.jobs();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|idx| format!("forge-worker-{idx}"))
            .build();

        match pool {
            Ok(pool) => pool.in_place_scope(|scope| {
                let work = &work;
                self.drive(plan, &shared, &rx, |id| scope.spawn(move |_| work(id)))
            }),
            Err(e) => {
                tracing::warn!("failed to create worker pool ({e}), running sequentially");
                self.drive(plan, &shared, &rx, work)
            }
        }
    }

    /// The owner loop. `spawn` hands a target to a worker.
    fn drive<T, S>(
        &self,
        plan: &BuildPlan<T>,
        shared: &Mutex<Shared>,
        rx: &Receiver<Completion>,
        mut spawn: S,
    ) -> RunReport
    where
        S: FnMut(TargetId),
    {
        let mut report = RunReport::new(RunOutcome::Failure);
        let mut resolved: Option<RunOutcome> = None;
        let mut in_flight = 0usize;
        let mut dispatched = 0usize;

        loop {
            let (ready, complete) = {
                let mut guard = shared.lock();
                if guard.stopped {
                    (Vec::new(), false)
                } else {
                    let mut ready = Vec::new();
                    let complete = plan.prepare_actions(&mut guard.plan, |id, _| {
                        ready.push(id);
                        true
                    });
                    (ready, complete)
                }
            };

            if complete && resolved.is_none() {
                resolved = Some(RunOutcome::Success);
            }

            for id in ready {
                tracing::trace!(target_id = %id, name = plan.name(id), "dispatch");
                in_flight += 1;
                dispatched += 1;
                spawn(id);
            }

            if in_flight == 0 {
                break;
            }

            let Ok(completion) = rx.recv() else {
                tracing::error!("completion channel closed with {in_flight} targets in flight");
                resolved.get_or_insert(RunOutcome::Failure);
                break;
            };
            in_flight -= 1;

            match completion {
                Completion::Finished { id, ok: true } => {
                    plan.mark_done(&mut shared.lock().plan, id);
                    report.succeeded.push(id);
                }
                Completion::Finished { id, ok: false } => {
                    tracing::debug!(target_id = %id, name = plan.name(id), "target failed");
                    report.failed.push(id);
                    if !self.config.keep_going {
                        shared.lock().stopped = true;
                        resolved.get_or_insert(RunOutcome::Failure);
                    }
                }
                Completion::Skipped { id } => report.skipped.push(id),
            }
        }

        if resolved.is_none() && !report.failed.is_empty() {
            tracing::debug!(
                failed = report.failed.len(),
                "plan starved behind failed targets"
            );
        }

        report.outcome = resolved.unwrap_or(RunOutcome::Failure);
        report.not_started = plan.len() - dispatched;
        report
    }
}

/// Body of one job.
fn run_target<T, F>(
    plan: &BuildPlan<T>,
    shared: &Mutex<Shared>,
    exec: &F,
    id: TargetId,
) -> Completion
where
    F: Fn(TargetId, &T) -> bool,
{
    if shared.lock().stopped {
        return Completion::Skipped { id };
    }

    let ok = panic::catch_unwind(AssertUnwindSafe(|| exec(id, plan.payload(id))))
        .unwrap_or_else(|_| {
            tracing::error!(target_id = %id, name = plan.name(id), "action panicked");
            false
        });

    Completion::Finished { id, ok }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
