//! Build configuration.

use std::path::{Path, PathBuf};

use forge_kb::UnresolvedPolicy;
use forge_plan::SchedulerConfig;

/// Default file name of the persisted knowledge base.
pub const DEFAULT_DB_NAME: &str = "forge.db";

/// Settings for one build directory.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Where outputs and the knowledge base live.
    pub build_dir: PathBuf,
    /// File name of the knowledge base inside `build_dir`.
    pub db_name: String,
    /// Number of parallel jobs (0 = auto-detect).
    pub jobs: usize,
    /// Keep building independent targets after a failure.
    pub keep_going: bool,
    pub unresolved: UnresolvedPolicy,
    /// Directories loaded before discovery starts.
    pub roots: Vec<PathBuf>,
}

impl BuildConfig {
    /// Create a configuration for the given build directory.
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            db_name: DEFAULT_DB_NAME.to_owned(),
            jobs: 0,
            keep_going: false,
            unresolved: UnresolvedPolicy::BestEffort,
            roots: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = name.into();
        self
    }

    /// Set the number of parallel jobs.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    #[must_use]
    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    #[must_use]
    pub fn with_unresolved(mut self, policy: UnresolvedPolicy) -> Self {
        self.unresolved = policy;
        self
    }

    /// Add a root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Path of the persisted knowledge base.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.build_dir.join(&self.db_name)
    }

    /// Default output path for a target.
    #[must_use]
    pub fn output_path(&self, target: &str) -> PathBuf {
        self.build_dir.join(target)
    }

    #[must_use]
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.jobs).with_keep_going(self.keep_going)
    }
}
