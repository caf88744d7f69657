use super::*;
use crate::error::KnowledgeError;
use crate::origin::Origin;
use crate::testing::{at, MockCompiler, MockResolver};
use crate::toolchain::DeclaredTarget;
use pretty_assertions::assert_eq;

/// An application in /app whose imports live in library directories that
/// are only reachable through prefix maps.
fn workspace() -> (MockCompiler, MockResolver) {
    let cc = MockCompiler::new();
    cc.plain("/app/main.cpp", &["net.http", "util"]);
    cc.interface("/libs/net/http.cppm", "net.http", &["net.socket", "crypto.aes"]);
    cc.interface("/libs/net/socket.cppm", "net.socket", &[]);
    cc.interface("/libs/util/util.cppm", "util", &[]);
    cc.interface("/libs/crypto/aes.cppm", "crypto.aes", &[]);

    let resolver = MockResolver::new();
    let app = Origin::new("/app", "/app")
        .with_prefix("net", vec![PathBuf::from("/libs/net")])
        .with_prefix("util%", vec![PathBuf::from("/libs/util")])
        .with_prefix("gfx", vec![PathBuf::from("/libs/gfx")]);
    resolver.map(
        Path::new("/app"),
        app,
        &["main.cpp"],
        vec![DeclaredTarget {
            name: "app".into(),
            path: "/app/main.cpp".into(),
        }],
    );
    let net = Origin::new("/libs/net", "/libs/net")
        .with_prefix("crypto", vec![PathBuf::from("/libs/crypto")]);
    resolver.map(Path::new("/libs/net"), net, &["http.cppm", "socket.cppm"], Vec::new());
    resolver.dir("/libs/util", &["util.cppm"]);
    resolver.dir("/libs/crypto", &["aes.cppm"]);
    (cc, resolver)
}

#[test]
fn add_directory_reports_unknown_imports() {
    let (cc, resolver) = workspace();
    let session = BuildSession::at(&cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();

    let unsatisfied = kb.add_directory(&session, Path::new("/app")).unwrap();
    assert_eq!(
        unsatisfied,
        vec![Reference::interface("net.http"), Reference::interface("util")]
    );
    assert_eq!(kb.declared_targets().len(), 1);
    assert!(kb.find_origin(Path::new("/app")).is_some());
}

#[test]
fn discovery_follows_prefix_maps_breadth_first() {
    let (cc, resolver) = workspace();
    let session = BuildSession::at(&cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();
    let unsatisfied = kb.add_directory(&session, Path::new("/app")).unwrap();

    let left = kb.run_discovery(&session, unsatisfied).unwrap();
    assert!(left.is_empty(), "{left:?}");

    // crypto is only known through the net origin's own prefix map.
    assert_eq!(
        resolver.loads(),
        vec![
            PathBuf::from("/app"),
            PathBuf::from("/libs/net"),
            PathBuf::from("/libs/util"),
            PathBuf::from("/libs/crypto"),
        ]
    );
    for name in ["net.http", "net.socket", "util", "crypto.aes"] {
        assert!(kb.resolves(&Reference::interface(name)), "{name}");
    }
    assert!(kb.unsatisfied_references().is_empty());
    kb.verify_indices().unwrap();
}

#[test]
fn unmatched_reference_is_left_over_not_fatal() {
    let (cc, resolver) = workspace();
    cc.plain("/app/main.cpp", &["nothing.here"]);
    let session = BuildSession::at(&cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();
    let unsatisfied = kb.add_directory(&session, Path::new("/app")).unwrap();

    let left = kb.run_discovery(&session, unsatisfied).unwrap();
    assert_eq!(left, vec![Reference::interface("nothing.here")]);
    assert_eq!(resolver.loads(), vec![PathBuf::from("/app")]);
}

#[test]
fn each_directory_is_explored_once() {
    let (cc, resolver) = workspace();
    // Both names map to /libs/net, and neither is defined there.
    cc.plain("/app/main.cpp", &["net.ftp", "net.smtp"]);
    let session = BuildSession::at(&cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();
    let unsatisfied = kb.add_directory(&session, Path::new("/app")).unwrap();

    let left = kb.run_discovery(&session, unsatisfied).unwrap();
    assert_eq!(
        left,
        vec![Reference::interface("net.ftp"), Reference::interface("net.smtp")]
    );
    let net_loads = resolver
        .loads()
        .iter()
        .filter(|p| p.as_path() == Path::new("/libs/net"))
        .count();
    assert_eq!(net_loads, 1);
}

#[test]
fn config_error_aborts_discovery() {
    let (cc, resolver) = workspace();
    resolver.break_dir("/libs/net");
    let session = BuildSession::at(&cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();
    let unsatisfied = kb.add_directory(&session, Path::new("/app")).unwrap();

    let err = kb.run_discovery(&session, unsatisfied).unwrap_err();
    assert!(matches!(err, KnowledgeError::Config(_)), "{err}");
}

#[test]
fn duplicate_definition_is_skipped() {
    let (cc, resolver) = workspace();
    cc.interface("/libs/util/other.cppm", "util", &[]);
    resolver.dir("/libs/util", &["util.cppm", "other.cppm"]);
    let session = BuildSession::at(&cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();
    let unsatisfied = kb.add_directory(&session, Path::new("/app")).unwrap();

    kb.run_discovery(&session, unsatisfied).unwrap();
    let util = kb.find(&Reference::interface("util")).unwrap();
    assert_eq!(kb.source(util).unwrap().path(), Path::new("/libs/util/util.cppm"));
    assert!(kb.find_path(Path::new("/libs/util/other.cppm")).is_none());
    kb.verify_indices().unwrap();
}

#[test]
fn header_references_get_placeholders() {
    let cc = MockCompiler::new();
    cc.interface("/p/x.cppm", "x", &["/usr/include/vector.h", "missing"]);
    let resolver = MockResolver::new();
    let origin = resolver.dir("/p", &[]);
    let session = BuildSession::at(&cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();
    let origin = kb.register_origin(origin);

    let unsatisfied = kb
        .rescan_file(&session, Path::new("/p/x.cppm"), Some(origin))
        .unwrap();
    assert_eq!(unsatisfied, vec![Reference::interface("missing")]);

    let header = kb
        .find(&Reference::user_header("/usr/include/vector.h"))
        .unwrap();
    let header = kb.source(header).unwrap();
    assert_eq!(header.path(), Path::new("/usr/include/vector.h"));
    assert_eq!(header.origin(), Some(origin));
    assert!(header.needs_recompile());
}

#[test]
fn rescan_replaces_the_previous_record() {
    let cc = MockCompiler::new();
    cc.interface("/p/x.cppm", "x", &[]);
    let resolver = MockResolver::new();
    let session = BuildSession::at(&cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();

    kb.rescan_file(&session, Path::new("/p/x.cppm"), None).unwrap();
    cc.interface("/p/x.cppm", "renamed", &[]);
    kb.rescan_file(&session, Path::new("/p/x.cppm"), None).unwrap();

    assert!(!kb.resolves(&Reference::interface("x")));
    assert!(kb.resolves(&Reference::interface("renamed")));
    assert_eq!(kb.len(), 1);
}

#[test]
fn unreadable_file_is_still_registered() {
    let cc = MockCompiler::new();
    let resolver = MockResolver::new();
    let session = BuildSession::at(&cc, &resolver, at(10));
    let mut kb = KnowledgeBase::new();

    let unsatisfied = kb
        .rescan_file(&session, Path::new("/p/garbage.cpp"), None)
        .unwrap();
    assert!(unsatisfied.is_empty());
    let id = kb.find_path(Path::new("/p/garbage.cpp")).unwrap();
    let source = kb.source(id).unwrap();
    assert_eq!(source.kind(), RefKind::Source);
    assert!(source.needs_rescan());
}
