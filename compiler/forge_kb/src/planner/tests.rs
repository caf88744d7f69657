use std::path::Path;

use super::*;
use crate::testing::{at, MockCompiler, MockResolver};
use crate::toolchain::{ArtifactPaths, BuildSession};
use pretty_assertions::assert_eq;

fn load(cc: &MockCompiler, files: &[&str]) -> KnowledgeBase {
    let resolver = MockResolver::new();
    resolver.dir("/p", files);
    let session = BuildSession::at(cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();
    let unsatisfied = kb.add_directory(&session, Path::new("/p")).unwrap();
    kb.run_discovery(&session, unsatisfied).unwrap();
    kb
}

fn id(kb: &KnowledgeBase, path: &str) -> SourceId {
    kb.find_path(Path::new(path)).unwrap()
}

fn build(kb: &KnowledgeBase, path: &str) {
    let id = id(kb, path);
    let source = kb.source(id).unwrap();
    let mut paths = ArtifactPaths::default();
    if source.kind().produces_interface() {
        paths.interface = format!("{path}.bmi").into();
    }
    if source.kind().produces_object() {
        paths.object = format!("{path}.o").into();
    }
    kb.record_artifacts(id, paths).unwrap();
}

fn target(plan: &BuildPlan<CompileAction>, name: &str) -> TargetId {
    plan.ids().find(|&t| plan.name(t) == name).unwrap()
}

fn deps(plan: &BuildPlan<CompileAction>, name: &str) -> Vec<String> {
    let mut names: Vec<String> = plan
        .dependencies(target(plan, name))
        .iter()
        .map(|&d| plan.name(d).to_owned())
        .collect();
    names.sort();
    names
}

fn link_inputs(plan: &BuildPlan<CompileAction>, kb: &KnowledgeBase, name: &str) -> Vec<PathBuf> {
    match plan.payload(target(plan, name)) {
        CompileAction::Link(step) => step
            .inputs
            .iter()
            .map(|&i| kb.source(i).unwrap().path().to_path_buf())
            .collect(),
        CompileAction::Compile(_) => panic!("{name} is not a link target"),
    }
}

fn xyz() -> (MockCompiler, KnowledgeBase) {
    let cc = MockCompiler::new();
    cc.plain("/p/x.cpp", &["y"]);
    cc.interface("/p/y.cppm", "y", &["z"]);
    cc.interface("/p/z.cppm", "z", &[]);
    let kb = load(&cc, &["x.cpp", "y.cppm", "z.cppm"]);
    (cc, kb)
}

#[test]
fn chain_yields_three_compiles_and_one_link() {
    let (_cc, kb) = xyz();
    let request = LinkRequest::new("app", id(&kb, "/p/x.cpp"), "/out/app");
    let plan = kb
        .create_build_plan(&[request], UnresolvedPolicy::Strict)
        .unwrap();

    assert_eq!(plan.len(), 4);
    let compiles = plan
        .iter()
        .filter(|(_, a)| matches!(a, CompileAction::Compile(_)))
        .count();
    assert_eq!(compiles, 3);

    assert_eq!(deps(&plan, "link app"), vec!["/p/x.cpp", "/p/y.cppm", "/p/z.cppm"]);
    assert_eq!(deps(&plan, "/p/x.cpp"), vec!["/p/y.cppm", "/p/z.cppm"]);
    assert_eq!(deps(&plan, "/p/y.cppm"), vec!["/p/z.cppm"]);
    assert!(deps(&plan, "/p/z.cppm").is_empty());
    assert_eq!(
        link_inputs(&plan, &kb, "link app"),
        vec![
            PathBuf::from("/p/x.cpp"),
            PathBuf::from("/p/y.cppm"),
            PathBuf::from("/p/z.cppm"),
        ]
    );
}

#[test]
fn bmi_closure_is_transitive_without_reexports() {
    let (_cc, kb) = xyz();
    let closure = kb
        .bmi_closure(id(&kb, "/p/x.cpp"), &mut |_, _| Ok(()))
        .unwrap();
    assert_eq!(closure, vec![id(&kb, "/p/y.cppm"), id(&kb, "/p/z.cppm")]);
}

#[test]
fn reexported_module_is_visible_to_importers() {
    let cc = MockCompiler::new();
    cc.plain("/p/a.cpp", &["b"]);
    cc.reexporting("/p/b.cppm", "b", &[], &["c"]);
    cc.interface("/p/c.cppm", "c", &[]);
    let kb = load(&cc, &["a.cpp", "b.cppm", "c.cppm"]);
    build(&kb, "/p/b.cppm");

    let request = LinkRequest::new("app", id(&kb, "/p/a.cpp"), "/out/app");
    let plan = kb
        .create_build_plan(&[request], UnresolvedPolicy::Strict)
        .unwrap();

    // b is up to date, but c is only reachable through b's export.
    assert_eq!(deps(&plan, "/p/a.cpp"), vec!["/p/c.cppm"]);
    assert!(plan.ids().all(|t| plan.name(t) != "/p/b.cppm"));
}

#[test]
fn up_to_date_sources_link_directly() {
    let (_cc, kb) = xyz();
    for path in ["/p/x.cpp", "/p/y.cppm", "/p/z.cppm"] {
        build(&kb, path);
    }

    let request = LinkRequest::new("app", id(&kb, "/p/x.cpp"), "/out/app");
    let plan = kb
        .create_build_plan(&[request], UnresolvedPolicy::Strict)
        .unwrap();

    assert_eq!(plan.len(), 1);
    assert!(deps(&plan, "link app").is_empty());
    assert_eq!(link_inputs(&plan, &kb, "link app").len(), 3);
}

#[test]
fn only_stale_sources_get_targets() {
    let (_cc, kb) = xyz();
    for path in ["/p/x.cpp", "/p/y.cppm", "/p/z.cppm"] {
        build(&kb, path);
    }
    kb.source(id(&kb, "/p/x.cpp")).unwrap().flag_recompile();

    let request = LinkRequest::new("app", id(&kb, "/p/x.cpp"), "/out/app");
    let plan = kb
        .create_build_plan(&[request], UnresolvedPolicy::Strict)
        .unwrap();

    assert_eq!(plan.len(), 2);
    assert_eq!(deps(&plan, "link app"), vec!["/p/x.cpp"]);
    assert!(deps(&plan, "/p/x.cpp").is_empty());
}

#[test]
fn interface_pulls_in_its_implementations() {
    let cc = MockCompiler::new();
    cc.plain("/p/main.cpp", &["core"]);
    cc.interface("/p/core.cppm", "core", &[]);
    cc.implementation("/p/core_a.cpp", "core", &[]);
    cc.implementation("/p/core_b.cpp", "core", &[]);
    let kb = load(&cc, &["main.cpp", "core.cppm", "core_a.cpp", "core_b.cpp"]);

    let request = LinkRequest::new("app", id(&kb, "/p/main.cpp"), "/out/app");
    let plan = kb
        .create_build_plan(&[request], UnresolvedPolicy::Strict)
        .unwrap();

    let mut inputs = link_inputs(&plan, &kb, "link app");
    inputs.sort();
    assert_eq!(
        inputs,
        vec![
            PathBuf::from("/p/core.cppm"),
            PathBuf::from("/p/core_a.cpp"),
            PathBuf::from("/p/core_b.cpp"),
            PathBuf::from("/p/main.cpp"),
        ]
    );
    assert_eq!(deps(&plan, "/p/core_a.cpp"), vec!["/p/core.cppm"]);
}

#[test]
fn stale_header_gets_a_compile_target_but_no_link_input() {
    let cc = MockCompiler::new();
    cc.plain("/p/x.cpp", &["/inc/config.h"]);
    let kb = load(&cc, &["x.cpp"]);

    let request = LinkRequest::new("app", id(&kb, "/p/x.cpp"), "/out/app");
    let plan = kb
        .create_build_plan(&[request], UnresolvedPolicy::Strict)
        .unwrap();

    assert_eq!(plan.len(), 3);
    assert_eq!(deps(&plan, "/p/x.cpp"), vec!["/inc/config.h"]);
    assert_eq!(link_inputs(&plan, &kb, "link app"), vec![PathBuf::from("/p/x.cpp")]);
}

#[test]
fn shared_sources_compile_once_across_requests() {
    let cc = MockCompiler::new();
    cc.plain("/p/app.cpp", &["y"]);
    cc.plain("/p/tool.cpp", &["y"]);
    cc.interface("/p/y.cppm", "y", &["z"]);
    cc.interface("/p/z.cppm", "z", &[]);
    let kb = load(&cc, &["app.cpp", "tool.cpp", "y.cppm", "z.cppm"]);

    let requests = [
        LinkRequest::new("app", id(&kb, "/p/app.cpp"), "/out/app"),
        LinkRequest::new("tool", id(&kb, "/p/tool.cpp"), "/out/tool"),
    ];
    let plan = kb
        .create_build_plan(&requests, UnresolvedPolicy::Strict)
        .unwrap();

    // 4 compiles, 2 links.
    assert_eq!(plan.len(), 6);
    assert_eq!(
        deps(&plan, "link tool"),
        vec!["/p/tool.cpp", "/p/y.cppm", "/p/z.cppm"]
    );
}

#[test]
fn unresolved_reference_policy() {
    let cc = MockCompiler::new();
    cc.plain("/p/x.cpp", &["ghost", "y"]);
    cc.interface("/p/y.cppm", "y", &[]);
    let kb = load(&cc, &["x.cpp", "y.cppm"]);
    let request = LinkRequest::new("app", id(&kb, "/p/x.cpp"), "/out/app");

    let plan = kb
        .create_build_plan(std::slice::from_ref(&request), UnresolvedPolicy::BestEffort)
        .unwrap();
    assert_eq!(plan.len(), 3);
    assert_eq!(deps(&plan, "/p/x.cpp"), vec!["/p/y.cppm"]);

    let err = kb
        .create_build_plan(&[request], UnresolvedPolicy::Strict)
        .unwrap_err();
    match err {
        KnowledgeError::Unresolved { reference, from } => {
            assert_eq!(reference, Reference::interface("ghost"));
            assert_eq!(from, PathBuf::from("/p/x.cpp"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn shared_library_is_unsupported() {
    let (_cc, kb) = xyz();
    let request = LinkRequest::new("libx", id(&kb, "/p/x.cpp"), "/out/libx.so")
        .with_kind(OutputKind::SharedLibrary);

    let err = kb
        .create_build_plan(&[request], UnresolvedPolicy::BestEffort)
        .unwrap_err();
    assert!(matches!(err, KnowledgeError::Unsupported(_)), "{err}");
}

#[test]
fn unknown_entry_is_rejected() {
    let (_cc, mut kb) = xyz();
    let x = id(&kb, "/p/x.cpp");
    kb.erase(Path::new("/p/x.cpp"));

    let err = kb
        .create_build_plan(&[LinkRequest::new("app", x, "/out/app")], UnresolvedPolicy::BestEffort)
        .unwrap_err();
    assert!(matches!(err, KnowledgeError::UnknownSource(gone) if gone == x));
}

#[test]
fn partitions_resolve_to_every_definition() {
    let cc = MockCompiler::new();
    cc.interface("/p/m.cppm", "m", &["m:a"]);
    cc.unit(
        "/p/m_a.cppm",
        crate::toolchain::ScanOutput {
            name: "m:a".into(),
            kind: RefKind::Partition,
            required: Vec::new(),
            exported: Vec::new(),
        },
    );
    let kb = load(&cc, &["m.cppm", "m_a.cppm"]);

    let request = LinkRequest::new("libm", id(&kb, "/p/m.cppm"), "/out/libm.a")
        .with_kind(OutputKind::StaticLibrary);
    let plan = kb
        .create_build_plan(&[request], UnresolvedPolicy::Strict)
        .unwrap();

    assert_eq!(deps(&plan, "/p/m.cppm"), vec!["/p/m_a.cppm"]);
    assert_eq!(link_inputs(&plan, &kb, "link libm").len(), 2);
}
