//! Integration tests for seeding stores from ZIP archives.

use std::io::{Cursor, Write};

use avmfs_core::{
    load_seed, load_seed_from_path, AvmDiskDriver, FileStatus, MemoryStore, MountConfig, Session,
    TreeConnection, VersionedStore, VERSION_HEAD,
};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Build an archive in memory; names ending in `/` become directory entries.
fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
    }
    zip.finish().unwrap().into_inner()
}

#[test]
fn test_load_seed_entries() {
    let data = build_zip(&[
        ("empty/", ""),
        ("docs/a.txt", "alpha"),
        ("docs/sub/b.txt", "beta"),
        ("readme.txt", "hi"),
    ]);
    let seed = load_seed(Cursor::new(data)).unwrap();

    assert_eq!(seed.files.len(), 3);
    assert_eq!(seed.files["docs/sub/b.txt"], b"beta");
    let dirs: Vec<&str> = seed.directories.iter().map(|s| s.as_str()).collect();
    assert_eq!(dirs, vec!["docs", "docs/sub", "empty"]);
    assert!(!seed.manifest.snapshot);
}

#[test]
fn test_apply_seed_with_snapshot() {
    let data = build_zip(&[
        (
            "manifest.json",
            r#"{"store": "main:/", "description": "demo", "snapshot": true}"#,
        ),
        ("docs/a.txt", "alpha"),
    ]);
    let seed = load_seed(Cursor::new(data)).unwrap();
    assert_eq!(seed.manifest.description.as_deref(), Some("demo"));

    let store = MemoryStore::with_store("main");
    let version = seed.apply(&store, seed.target("other:/")).unwrap();
    assert_eq!(version, Some(1));
    assert_eq!(store.read_content(1, "main:/docs/a.txt").unwrap(), b"alpha");

    // Seeded content is visible through a mount of the snapshot
    let driver = AvmDiskDriver::with_memory_store(&store);
    let ctx = driver
        .create_context(&MountConfig::new("main:/").with_version(1))
        .unwrap();
    let tree = TreeConnection::new("snap", ctx);
    let mut sess = Session::new("client");
    assert_eq!(
        driver.file_exists(&mut sess, &tree, "docs\\a.txt"),
        FileStatus::FileExists
    );
}

#[test]
fn test_apply_twice_overwrites_files() {
    let store = MemoryStore::with_store("main");

    let first = load_seed(Cursor::new(build_zip(&[("docs/a.txt", "one")]))).unwrap();
    first.apply(&store, "main:/").unwrap();

    let second = load_seed(Cursor::new(build_zip(&[("docs/a.txt", "two")]))).unwrap();
    assert_eq!(second.apply(&store, "main:/").unwrap(), None);

    assert_eq!(
        store.read_content(VERSION_HEAD, "main:/docs/a.txt").unwrap(),
        b"two"
    );
}

#[test]
fn test_unsafe_entry_rejected() {
    let data = build_zip(&[("../escape.txt", "x")]);
    assert!(load_seed(Cursor::new(data)).is_err());
}

#[test]
fn test_load_seed_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seed.zip");
    std::fs::write(&path, build_zip(&[("index.html", "<html/>")])).unwrap();

    let seed = load_seed_from_path(&path).unwrap();
    let store = MemoryStore::with_store("web");
    seed.apply(&store, "web:/").unwrap();
    assert_eq!(
        store.read_content(VERSION_HEAD, "web:/index.html").unwrap(),
        b"<html/>"
    );
}
