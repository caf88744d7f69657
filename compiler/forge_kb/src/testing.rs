//! In-memory collaborators for tests.
//!
//! [`MockCompiler`] keeps a table of "files" with canned scan results and
//! modification times; compiling one yields fake artifact paths under an
//! output directory. [`MockResolver`] serves canned source maps.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{ConfigError, ScanFailure, ToolError};
use crate::hash::{hash_string, ContentHash};
use crate::origin::Origin;
use crate::reference::{RefKind, Reference};
use crate::source::SourceDef;
use crate::toolchain::{
    ArtifactPaths, Compiler, DeclaredTarget, ModuleArtifact, Resolver, ScanOutput, SourceMap,
    SourceStatus,
};

/// A point in time `secs` seconds after the epoch.
#[must_use]
pub fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

#[derive(Debug, Clone)]
struct MockUnit {
    scan: ScanOutput,
    mtime: SystemTime,
    scan_error: bool,
}

#[derive(Debug, Default)]
struct CompilerState {
    units: FxHashMap<PathBuf, MockUnit>,
    failing: FxHashSet<PathBuf>,
    compiled: Vec<PathBuf>,
    linked: Vec<(PathBuf, Vec<PathBuf>)>,
    module_inputs: FxHashMap<PathBuf, Vec<Reference>>,
    scans: usize,
}

/// Compiler double.
#[derive(Debug)]
pub struct MockCompiler {
    out_dir: PathBuf,
    settings: ContentHash,
    state: Mutex<CompilerState>,
}

impl Default for MockCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_out_dir("/out")
    }

    pub fn with_out_dir(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            settings: hash_string("mock-cc"),
            state: Mutex::new(CompilerState::default()),
        }
    }

    /// Change the reported settings hash.
    #[must_use]
    pub fn with_settings(mut self, flags: &str) -> Self {
        self.settings = hash_string(flags);
        self
    }

    /// Add or replace a file with a fixed scan result.
    pub fn unit(&self, path: impl Into<PathBuf>, scan: ScanOutput) {
        self.state.lock().units.insert(
            path.into(),
            MockUnit {
                scan,
                mtime: SystemTime::UNIX_EPOCH,
                scan_error: false,
            },
        );
    }

    /// Primary interface `name` importing the interfaces in `imports`.
    pub fn interface(&self, path: impl Into<PathBuf>, name: &str, imports: &[&str]) {
        self.unit(path, scan(RefKind::Interface, name, imports, &[]));
    }

    /// Primary interface that imports and re-exports `exports`.
    pub fn reexporting(&self, path: impl Into<PathBuf>, name: &str, imports: &[&str], exports: &[&str]) {
        self.unit(path, scan(RefKind::Interface, name, imports, exports));
    }

    /// Implementation unit of module `name`.
    pub fn implementation(&self, path: impl Into<PathBuf>, name: &str, imports: &[&str]) {
        let mut out = scan(RefKind::Implementation, name, imports, &[]);
        out.required.push(Reference::interface(name));
        out.required.sort();
        self.unit(path, out);
    }

    /// Plain translation unit importing `imports`.
    pub fn plain(&self, path: impl Into<PathBuf>, imports: &[&str]) {
        let path = path.into();
        let name = path.display().to_string();
        self.unit(path, scan(RefKind::Source, &name, imports, &[]));
    }

    /// Make a header unit known so its status can be reported.
    pub fn header(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let name = path.display().to_string();
        self.unit(
            path,
            ScanOutput {
                name,
                kind: RefKind::UserHeader,
                required: Vec::new(),
                exported: Vec::new(),
            },
        );
    }

    /// Set a file's modification time.
    pub fn touch(&self, path: impl AsRef<Path>, mtime: SystemTime) {
        if let Some(unit) = self.state.lock().units.get_mut(path.as_ref()) {
            unit.mtime = mtime;
        }
    }

    /// Delete a file.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.state.lock().units.remove(path.as_ref());
    }

    /// Make compiling (or linking to) `path` fail.
    pub fn fail(&self, path: impl Into<PathBuf>) {
        self.state.lock().failing.insert(path.into());
    }

    /// Make scanning `path` fail after recovering its current scan result.
    pub fn fail_scan(&self, path: impl AsRef<Path>) {
        if let Some(unit) = self.state.lock().units.get_mut(path.as_ref()) {
            unit.scan_error = true;
        }
    }

    /// Files compiled so far, in completion order.
    #[must_use]
    pub fn compiled(&self) -> Vec<PathBuf> {
        self.state.lock().compiled.clone()
    }

    /// `(output, objects)` for every link so far.
    #[must_use]
    pub fn linked(&self) -> Vec<(PathBuf, Vec<PathBuf>)> {
        self.state.lock().linked.clone()
    }

    /// References of the interfaces handed to the last compile of `path`.
    #[must_use]
    pub fn modules_seen(&self, path: impl AsRef<Path>) -> Vec<Reference> {
        self.state
            .lock()
            .module_inputs
            .get(path.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn scan_count(&self) -> usize {
        self.state.lock().scans
    }

    fn artifact(&self, path: &Path, ext: &str) -> PathBuf {
        let stem = path
            .file_name()
            .map_or_else(|| "unit".into(), |n| n.to_string_lossy().into_owned());
        self.out_dir.join(format!("{stem}.{ext}"))
    }
}

fn scan(kind: RefKind, name: &str, imports: &[&str], exports: &[&str]) -> ScanOutput {
    let mut required: Vec<Reference> = imports
        .iter()
        .chain(exports)
        .map(|&i| import_ref(i))
        .collect();
    required.sort();
    required.dedup();
    let mut exported: Vec<Reference> = exports.iter().map(|&e| import_ref(e)).collect();
    exported.sort();
    ScanOutput {
        name: name.to_owned(),
        kind,
        required,
        exported,
    }
}

/// `"m"` imports an interface, `"m:p"` a partition, `"/x.h"` a user header.
fn import_ref(spec: &str) -> Reference {
    if spec.starts_with('/') {
        Reference::user_header(spec)
    } else if spec.contains(':') {
        Reference::partition(spec)
    } else {
        Reference::interface(spec)
    }
}

impl Compiler for MockCompiler {
    fn scan(&self, _origin: Option<&Origin>, path: &Path) -> Result<ScanOutput, ScanFailure> {
        let mut state = self.state.lock();
        state.scans += 1;
        match state.units.get(path) {
            Some(unit) if unit.scan_error => Err(ScanFailure {
                path: path.to_path_buf(),
                message: "unexpected token".to_owned(),
                partial: Some(unit.scan.clone()),
            }),
            Some(unit) => Ok(unit.scan.clone()),
            None => Err(ScanFailure {
                path: path.to_path_buf(),
                message: "no such file".to_owned(),
                partial: None,
            }),
        }
    }

    fn compile(
        &self,
        _origin: Option<&Origin>,
        source: &SourceDef,
        modules: &[ModuleArtifact],
    ) -> Result<ArtifactPaths, ToolError> {
        let mut state = self.state.lock();
        if state.failing.contains(&source.path) {
            return Err(ToolError::new(1, format!("{}: error", source.path.display())));
        }
        if let Some(missing) = modules.iter().find(|m| m.interface_path.as_os_str().is_empty()) {
            return Err(ToolError::new(
                1,
                format!("{}: module {} not built", source.path.display(), missing.reference),
            ));
        }
        state.compiled.push(source.path.clone());
        state.module_inputs.insert(
            source.path.clone(),
            modules.iter().map(|m| m.reference.clone()).collect(),
        );
        drop(state);

        let mut paths = ArtifactPaths::default();
        if source.kind.produces_interface() {
            paths.interface = self.artifact(&source.path, "bmi");
        }
        if source.kind.produces_object() {
            paths.object = self.artifact(&source.path, "o");
        }
        Ok(paths)
    }

    fn link(&self, objects: &[PathBuf], output: &Path) -> Result<(), ToolError> {
        let mut state = self.state.lock();
        if state.failing.contains(output) {
            return Err(ToolError::new(1, format!("{}: link error", output.display())));
        }
        state.linked.push((output.to_path_buf(), objects.to_vec()));
        Ok(())
    }

    fn source_status(&self, kind: RefKind, path: &Path, since: SystemTime) -> SourceStatus {
        match self.state.lock().units.get(path) {
            Some(unit) if unit.mtime > since => SourceStatus::Modified,
            Some(_) => SourceStatus::NotModified,
            None if kind.is_header() => SourceStatus::NotModified,
            None => SourceStatus::Missing,
        }
    }

    fn settings_hash(&self) -> ContentHash {
        self.settings
    }
}

#[derive(Debug, Default)]
struct ResolverState {
    maps: FxHashMap<PathBuf, SourceMap>,
    changed: FxHashSet<PathBuf>,
    broken: FxHashSet<PathBuf>,
    loads: Vec<PathBuf>,
}

/// Resolver double serving canned source maps by directory.
#[derive(Debug, Default)]
pub struct MockResolver {
    state: Mutex<ResolverState>,
}

impl MockResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `files` from `dir` under a fresh origin rooted at `dir`.
    pub fn dir(&self, dir: impl Into<PathBuf>, files: &[&str]) -> Origin {
        let dir = dir.into();
        let origin = Origin::new(dir.clone(), dir.clone());
        self.map(&dir, origin.clone(), files, Vec::new());
        origin
    }

    /// Serve a map with an explicit origin and declared targets.
    pub fn map(&self, dir: &Path, origin: Origin, files: &[&str], targets: Vec<DeclaredTarget>) {
        let files = files.iter().map(|f| dir.join(f)).collect();
        self.state.lock().maps.insert(
            dir.to_path_buf(),
            SourceMap {
                files,
                origin,
                targets,
            },
        );
    }

    /// Report the origin loaded from `config_path` as changed.
    pub fn mark_changed(&self, config_path: impl Into<PathBuf>) {
        self.state.lock().changed.insert(config_path.into());
    }

    pub fn clear_changed(&self) {
        self.state.lock().changed.clear();
    }

    /// Make loading `dir` fail with an invalid-config error.
    pub fn break_dir(&self, dir: impl Into<PathBuf>) {
        self.state.lock().broken.insert(dir.into());
    }

    /// Directories loaded so far, in order.
    #[must_use]
    pub fn loads(&self) -> Vec<PathBuf> {
        self.state.lock().loads.clone()
    }
}

impl Resolver for MockResolver {
    fn load_map(&self, path: &Path) -> Result<SourceMap, ConfigError> {
        let mut state = self.state.lock();
        state.loads.push(path.to_path_buf());
        if state.broken.contains(path) {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "malformed".to_owned(),
            });
        }
        state.maps.get(path).cloned().ok_or_else(|| ConfigError::Io {
            path: path.to_path_buf(),
            source: io::Error::from(io::ErrorKind::NotFound),
        })
    }

    fn detect_change(&self, origin: &Origin, _since: SystemTime) -> bool {
        self.state.lock().changed.contains(&origin.config_path)
    }
}
