use std::time::Duration;

use super::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(root.join("main.cpp"), "import net.http;").unwrap();
    fs::write(root.join("core.cppm"), "export module core;").unwrap();
    fs::write(root.join("README.md"), "docs").unwrap();
    fs::write(root.join("config.h"), "#pragma once").unwrap();
    fs::create_dir(root.join("net")).unwrap();
    fs::write(root.join("net").join("http.cppm"), "export module net.http;").unwrap();
    fs::create_dir(root.join("util")).unwrap();
    dir
}

#[test]
fn lists_source_files_only() {
    let dir = tree();
    let map = DirResolver::new().load_map(dir.path()).unwrap();

    assert_eq!(
        map.files,
        vec![dir.path().join("core.cppm"), dir.path().join("main.cpp")]
    );
    assert!(map.targets.is_empty());
}

#[test]
fn subdirectories_become_prefixes() {
    let dir = tree();
    let map = DirResolver::new().load_map(dir.path()).unwrap();

    assert_eq!(map.origin.config_path, dir.path());
    assert_eq!(map.origin.working_dir, dir.path());
    let prefixes: Vec<_> = map
        .origin
        .prefix_maps
        .iter()
        .map(|m| (m.prefix.as_str(), m.directories.clone()))
        .collect();
    assert_eq!(
        prefixes,
        vec![
            ("net", vec![dir.path().join("net")]),
            ("util", vec![dir.path().join("util")]),
        ]
    );
    let dirs: Vec<_> = map.origin.candidate_directories("net.http").collect();
    assert_eq!(dirs, vec![dir.path().join("net").as_path()]);
}

#[test]
fn settings_are_applied_to_every_origin() {
    let dir = tree();
    let plain = DirResolver::new().load_map(dir.path()).unwrap();
    let tuned = DirResolver::new()
        .with_include("/usr/local/include")
        .with_option("-O2")
        .load_map(dir.path())
        .unwrap();

    assert_eq!(tuned.origin.include_paths, vec![PathBuf::from("/usr/local/include")]);
    assert_eq!(tuned.origin.options, vec!["-O2".to_owned()]);
    assert_ne!(plain.origin.settings_hash, tuned.origin.settings_hash);
}

#[test]
fn missing_directory_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let err = DirResolver::new()
        .load_map(&dir.path().join("absent"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err}");
}

#[test]
fn detect_change_compares_directory_mtime() {
    let dir = tree();
    let resolver = DirResolver::new();
    let origin = resolver.load_map(dir.path()).unwrap().origin;

    assert!(resolver.detect_change(&origin, SystemTime::UNIX_EPOCH));
    let later = SystemTime::now() + Duration::from_secs(3600);
    assert!(!resolver.detect_change(&origin, later));

    let gone = Origin::new(dir.path().join("absent"), dir.path());
    assert!(resolver.detect_change(&gone, later));
}
