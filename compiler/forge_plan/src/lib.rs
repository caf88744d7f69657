//! Build plans and their executor.
//!
//! A [`BuildPlan`] is a container of targets connected by dependency edges.
//! It knows nothing about what a target does: it only answers "which targets
//! are ready now?" through [`BuildPlan::prepare_actions`], and is re-queried
//! every time a target finishes.
//!
//! The [`Scheduler`] drives a plan to completion on a fixed-size worker pool:
//!
//! ```text
//! owner loop ──prepare_actions──► ready targets ──spawn──► worker pool
//!     ▲                                                        │
//!     └──────────────── completion channel ◄───────────────────┘
//! ```
//!
//! Plan state is serialized by a single mutex that is never held while a
//! target's action runs.

pub mod plan;
pub mod scheduler;

pub use plan::{BuildPlan, PlanState, TargetId, TargetState};
pub use scheduler::{RunOutcome, RunReport, Scheduler, SchedulerConfig};
