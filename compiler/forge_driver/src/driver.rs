//! The build pipeline.

use std::path::PathBuf;

use forge_kb::reference::merge_sorted;
use forge_kb::{
    persist, BuildSession, Compiler, KnowledgeBase, LinkRequest, OutputKind, Reference, Resolver,
};
use forge_plan::{RunReport, Scheduler};

use crate::config::BuildConfig;
use crate::error::DriverError;

/// A requested output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: String,
    /// Path of the unit the target is built from.
    pub entry: PathBuf,
    /// Defaults to `<build dir>/<name>`.
    pub output: Option<PathBuf>,
    pub kind: OutputKind,
}

impl TargetSpec {
    pub fn new(name: impl Into<String>, entry: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            output: None,
            kind: OutputKind::Executable,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: OutputKind) -> Self {
        self.kind = kind;
        self
    }
}

/// One build directory's knowledge base plus the collaborators to act on it.
pub struct Driver<'a> {
    config: BuildConfig,
    compiler: &'a dyn Compiler,
    resolver: &'a dyn Resolver,
    kb: KnowledgeBase,
}

impl<'a> Driver<'a> {
    /// Load the knowledge base for `config.build_dir`, or start empty.
    pub fn open(config: BuildConfig, compiler: &'a dyn Compiler, resolver: &'a dyn Resolver) -> Self {
        let kb = persist::load(&config.db_path(), compiler.settings_hash());
        Self {
            config,
            compiler,
            resolver,
            kb,
        }
    }

    #[must_use]
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Bring the knowledge base up to date without building anything.
    ///
    /// Returns the references discovery could not resolve.
    pub fn refresh(&mut self) -> Result<Vec<Reference>, DriverError> {
        let session = BuildSession::new(self.compiler, self.resolver);
        let report = self.kb.check_for_modifications(&session);

        let mut unsatisfied = report.unsatisfied;
        for root in &self.config.roots {
            if self.kb.find_origin(root).is_none() {
                merge_sorted(&mut unsatisfied, self.kb.add_directory(&session, root)?);
            }
        }
        let left = self.kb.run_discovery(&session, unsatisfied)?;
        let flagged = self.kb.check_for_recompile();

        tracing::info!(
            sources = self.kb.len(),
            rescanned = report.rescanned.len(),
            flagged,
            unresolved = left.len(),
            "knowledge base refreshed"
        );
        Ok(left)
    }

    /// Refresh, then build `targets`.
    pub fn build(&mut self, targets: &[TargetSpec]) -> Result<RunReport, DriverError> {
        self.refresh()?;
        self.execute(targets)
    }

    /// Refresh, then build declared targets by name. No names means every
    /// declared target.
    pub fn build_declared(&mut self, names: &[&str]) -> Result<RunReport, DriverError> {
        self.refresh()?;

        let declared = self.kb.declared_targets();
        let specs: Vec<TargetSpec> = if names.is_empty() {
            declared
                .iter()
                .map(|t| TargetSpec::new(t.name.clone(), t.path.clone()))
                .collect()
        } else {
            names
                .iter()
                .map(|&name| {
                    declared
                        .iter()
                        .find(|t| t.name == name)
                        .map(|t| TargetSpec::new(t.name.clone(), t.path.clone()))
                        .ok_or_else(|| DriverError::UnknownTarget(name.to_owned()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        self.execute(&specs)
    }

    /// Plan and run `targets` against the current knowledge base, then save.
    fn execute(&mut self, targets: &[TargetSpec]) -> Result<RunReport, DriverError> {
        let requests = targets
            .iter()
            .map(|spec| {
                let entry = self.kb.find_path(&spec.entry).ok_or_else(|| {
                    DriverError::UnknownEntry {
                        target: spec.name.clone(),
                        path: spec.entry.clone(),
                    }
                })?;
                let output = spec
                    .output
                    .clone()
                    .unwrap_or_else(|| self.config.output_path(&spec.name));
                Ok(LinkRequest::new(spec.name.clone(), entry, output).with_kind(spec.kind))
            })
            .collect::<Result<Vec<_>, DriverError>>()?;

        let plan = self.kb.create_build_plan(&requests, self.config.unresolved)?;
        let scheduler = Scheduler::new(self.config.scheduler_config());
        tracing::info!(targets = plan.len(), jobs = scheduler.jobs(), "building");

        let kb = &self.kb;
        let compiler = self.compiler;
        let report = scheduler.run(&plan, |_, action| action.execute(kb, compiler));

        // Whatever did get built is worth keeping.
        self.save()?;

        if report.is_success() {
            Ok(report)
        } else {
            Err(DriverError::BuildFailed {
                failed: report.failed.len(),
                not_run: report.skipped.len() + report.not_started,
            })
        }
    }

    /// Persist the knowledge base if it changed. Returns true if written.
    pub fn save(&self) -> Result<bool, DriverError> {
        if !self.kb.is_dirty() {
            return Ok(false);
        }
        persist::save(&self.config.db_path(), self.compiler.settings_hash(), &self.kb)?;
        Ok(true)
    }
}

impl std::fmt::Debug for Driver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("sources", &self.kb.len())
            .finish_non_exhaustive()
    }
}
