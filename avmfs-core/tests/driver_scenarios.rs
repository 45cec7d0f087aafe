//! End-to-end driver scenarios against the in-memory store.

use avmfs_core::{
    AccessMode, AvmDiskDriver, AvmError, FileAttributes, FileStatus, MemoryStore, MountConfig,
    OpenParams, Session, TreeConnection, VersionedStore,
};

fn mount(store: &MemoryStore, config: MountConfig) -> (AvmDiskDriver, TreeConnection) {
    let driver = AvmDiskDriver::with_memory_store(store);
    let ctx = driver.create_context(&config).expect("mount failed");
    (driver, TreeConnection::new("avm", ctx))
}

fn write_file(
    driver: &AvmDiskDriver,
    sess: &mut Session,
    tree: &TreeConnection,
    path: &str,
    data: &[u8],
) {
    let mut file = driver
        .create_file(sess, tree, &OpenParams::read_write(path))
        .unwrap();
    assert_eq!(
        driver.write_file(sess, tree, &mut file, data, 0).unwrap(),
        data.len()
    );
    driver.close_file(sess, tree, file).unwrap();
}

fn read_all(
    driver: &AvmDiskDriver,
    sess: &mut Session,
    tree: &TreeConnection,
    path: &str,
) -> Vec<u8> {
    let mut file = driver.open_file(sess, tree, &OpenParams::read(path)).unwrap();
    let mut buf = vec![0u8; 64];
    let n = driver.read_file(sess, tree, &mut file, &mut buf, 0).unwrap();
    driver.close_file(sess, tree, file).unwrap();
    buf.truncate(n);
    buf
}

#[test]
fn test_head_write_then_snapshot_is_read_only() {
    let store = MemoryStore::with_store("main");
    let (driver, head) = mount(&store, MountConfig::new("main:/"));
    let mut sess = Session::new("client");

    driver
        .create_directory(&mut sess, &head, &OpenParams::read_write("docs"))
        .unwrap();
    let mut file = driver
        .create_file(&mut sess, &head, &OpenParams::read_write("docs\\readme.txt"))
        .unwrap();
    assert_eq!(file.store_path(), "main://docs/readme.txt");
    assert_eq!(
        driver
            .write_file(&mut sess, &head, &mut file, b"0123456789", 0)
            .unwrap(),
        10
    );
    driver.close_file(&mut sess, &head, file).unwrap();

    let mut file = driver
        .open_file(&mut sess, &head, &OpenParams::read("docs\\readme.txt"))
        .unwrap();
    let mut buf = [0u8; 10];
    assert_eq!(
        driver.read_file(&mut sess, &head, &mut file, &mut buf, 0).unwrap(),
        10
    );
    assert_eq!(&buf, b"0123456789");
    driver.close_file(&mut sess, &head, file).unwrap();
    sess.end_transaction().unwrap();

    let version = store.create_snapshot("main").unwrap();
    let (driver, snap) = mount(&store, MountConfig::new("main:/").with_version(version));
    assert!(driver.is_read_only(snap.context()));

    let err = driver
        .open_file(
            &mut sess,
            &snap,
            &OpenParams::new("docs\\readme.txt", AccessMode::WriteOnly),
        )
        .unwrap_err();
    assert!(
        matches!(err, AvmError::AccessDenied(ref msg) if msg == "File docs\\readme.txt is read-only")
    );

    let file = driver
        .open_file(&mut sess, &snap, &OpenParams::read("docs\\readme.txt"))
        .unwrap();
    assert_eq!(file.granted_access(), AccessMode::ReadOnly);
    driver.close_file(&mut sess, &snap, file).unwrap();
    assert_eq!(
        read_all(&driver, &mut sess, &snap, "docs\\readme.txt"),
        b"0123456789"
    );

    let info = driver
        .get_file_information(&mut sess, &snap, "docs\\readme.txt")
        .unwrap()
        .unwrap();
    assert!(info.attributes.contains(FileAttributes::READ_ONLY));
    assert_eq!(info.size, 10);

    assert!(matches!(
        driver.create_file(&mut sess, &snap, &OpenParams::read_write("docs\\b.txt")),
        Err(AvmError::AccessDenied(_))
    ));
    assert!(matches!(
        driver.create_directory(&mut sess, &snap, &OpenParams::read_write("dir")),
        Err(AvmError::AccessDenied(_))
    ));
    assert!(matches!(
        driver.delete_file(&mut sess, &snap, "docs\\readme.txt"),
        Err(AvmError::AccessDenied(_))
    ));
    assert!(matches!(
        driver.rename_file(&mut sess, &snap, "docs\\readme.txt", "docs\\c.txt"),
        Err(AvmError::AccessDenied(_))
    ));
    assert_eq!(
        driver
            .set_file_information(
                &mut sess,
                &snap,
                "docs\\readme.txt",
                &avmfs_core::FileInfoUpdate::delete_on_close()
            )
            .unwrap_err()
            .to_string(),
        "Access denied: Store not writable, cannot set delete on close"
    );
}

#[test]
fn test_head_changes_do_not_reach_snapshot() {
    let store = MemoryStore::with_store("main");
    let (driver, head) = mount(&store, MountConfig::new("main:/"));
    let mut sess = Session::new("client");

    write_file(&driver, &mut sess, &head, "a.txt", b"old");
    sess.end_transaction().unwrap();
    let version = store.create_snapshot("main").unwrap();

    let mut file = driver
        .open_file(&mut sess, &head, &OpenParams::read_write("a.txt"))
        .unwrap();
    driver.write_file(&mut sess, &head, &mut file, b"new", 0).unwrap();
    driver.close_file(&mut sess, &head, file).unwrap();
    sess.end_transaction().unwrap();

    let (_, snap) = mount(&store, MountConfig::new("main:/").with_version(version));
    assert_eq!(read_all(&driver, &mut sess, &snap, "a.txt"), b"old");
    assert_eq!(read_all(&driver, &mut sess, &head, "a.txt"), b"new");
}

#[test]
fn test_wildcard_search() {
    let store = MemoryStore::with_store("main");
    let (driver, tree) = mount(&store, MountConfig::new("main:/"));
    let mut sess = Session::new("client");

    driver
        .create_directory(&mut sess, &tree, &OpenParams::read_write("docs"))
        .unwrap();
    write_file(&driver, &mut sess, &tree, "docs\\a.txt", b"a");
    write_file(&driver, &mut sess, &tree, "docs\\b.md", b"b");

    let names: Vec<String> = driver
        .start_search(&mut sess, &tree, "docs/*.txt", FileAttributes::NORMAL)
        .unwrap()
        .expect("search found nothing")
        .map(|info| info.name)
        .collect();
    assert_eq!(names, vec!["a.txt"]);

    let all = driver
        .start_search(&mut sess, &tree, "docs\\*.*", FileAttributes::NORMAL)
        .unwrap()
        .unwrap()
        .count();
    assert_eq!(all, 2);

    assert!(driver
        .start_search(&mut sess, &tree, "missing\\*", FileAttributes::NORMAL)
        .unwrap()
        .is_none());
}

#[test]
fn test_rename_onto_existing_name() {
    let store = MemoryStore::with_store("main");
    let (driver, tree) = mount(&store, MountConfig::new("main:/"));
    let mut sess = Session::new("client");

    write_file(&driver, &mut sess, &tree, "\\a.txt", b"alpha");
    write_file(&driver, &mut sess, &tree, "\\b.txt", b"beta");

    let err = driver
        .rename_file(&mut sess, &tree, "\\a.txt", "\\b.txt")
        .unwrap_err();
    assert!(matches!(err, AvmError::FileExists(ref msg) if msg == "Destination exists, \\b.txt"));
    assert_eq!(read_all(&driver, &mut sess, &tree, "\\a.txt"), b"alpha");

    let err = driver
        .rename_file(&mut sess, &tree, "\\nope.txt", "\\c.txt")
        .unwrap_err();
    assert_eq!(err.to_string(), "Source not found, \\nope.txt");

    driver
        .create_directory(&mut sess, &tree, &OpenParams::read_write("\\archive"))
        .unwrap();
    driver
        .rename_file(&mut sess, &tree, "\\a.txt", "\\archive\\a.txt")
        .unwrap();
    assert_eq!(
        driver.file_exists(&mut sess, &tree, "\\a.txt"),
        FileStatus::NotExist
    );
    assert_eq!(
        read_all(&driver, &mut sess, &tree, "\\archive\\a.txt"),
        b"alpha"
    );
}

#[test]
fn test_delete_non_empty_directory() {
    let store = MemoryStore::with_store("main");
    let (driver, tree) = mount(&store, MountConfig::new("main:/"));
    let mut sess = Session::new("client");

    driver
        .create_directory(&mut sess, &tree, &OpenParams::read_write("\\docs"))
        .unwrap();
    write_file(&driver, &mut sess, &tree, "\\docs\\a.txt", b"a");

    assert!(matches!(
        driver.delete_directory(&mut sess, &tree, "\\docs"),
        Err(AvmError::DirectoryNotEmpty(_))
    ));

    driver.delete_file(&mut sess, &tree, "\\docs\\a.txt").unwrap();
    driver.delete_directory(&mut sess, &tree, "\\docs").unwrap();
    assert!(store.lookup(-1, "main:/docs").unwrap().is_none());
}

#[test]
fn test_aborted_session_discards_changes() {
    let store = MemoryStore::with_store("main");
    let (driver, tree) = mount(&store, MountConfig::new("main:/"));

    let mut sess = Session::new("client");
    driver
        .create_directory(&mut sess, &tree, &OpenParams::read_write("kept"))
        .unwrap();
    sess.end_transaction().unwrap();

    driver
        .create_directory(&mut sess, &tree, &OpenParams::read_write("scratch"))
        .unwrap();
    sess.abort_transaction().unwrap();

    assert_eq!(
        driver.file_exists(&mut sess, &tree, "kept"),
        FileStatus::DirectoryExists
    );
    assert_eq!(
        driver.file_exists(&mut sess, &tree, "scratch"),
        FileStatus::NotExist
    );
}

#[test]
fn test_setup_validation() {
    let store = MemoryStore::with_store("main");
    let driver = AvmDiskDriver::with_memory_store(&store);

    let cases = [
        ("{}", "Driver setup error, Device missing init value: storePath"),
        (
            r#"{"storePath": "main:/", "version": ""}"#,
            "Driver setup error, Store version not specified",
        ),
        (
            r#"{"storePath": "main:/", "version": "abc"}"#,
            "Driver setup error, Invalid store version specified, abc",
        ),
        (
            r#"{"storePath": "main:/", "version": "-3"}"#,
            "Driver setup error, Invalid store version id specified, -3",
        ),
        (
            r#"{"storePath": "main:/", "version": 9}"#,
            "Driver setup error, Invalid store path/version, main:/ (9)",
        ),
    ];

    for (json, expected) in cases {
        let config = MountConfig::from_json(json).unwrap();
        let err = driver.create_context(&config).unwrap_err();
        assert_eq!(err.to_string(), expected, "config {}", json);
    }

    let ctx = driver
        .create_context(
            &MountConfig::from_json(r#"{"storePath": "main:/", "version": "0"}"#).unwrap(),
        )
        .unwrap();
    assert_eq!(ctx.version(), 0);
    assert_eq!(ctx.disk_info().total_units, 2_560_000);
}

#[test]
fn test_abort_keeps_other_session_commits() {
    let store = MemoryStore::with_store("main");
    let (driver, tree) = mount(&store, MountConfig::new("main:/"));
    let mut first = Session::new("first");
    let mut second = Session::new("second");

    driver
        .create_directory(&mut first, &tree, &OpenParams::read_write("a_dir"))
        .unwrap();
    // One writer at a time
    assert!(matches!(
        driver.create_directory(&mut second, &tree, &OpenParams::read_write("b_dir")),
        Err(AvmError::Transaction(_))
    ));
    first.abort_transaction().unwrap();

    driver
        .create_directory(&mut second, &tree, &OpenParams::read_write("b_dir"))
        .unwrap();
    second.end_transaction().unwrap();

    driver
        .create_directory(&mut first, &tree, &OpenParams::read_write("a_dir"))
        .unwrap();
    first.abort_transaction().unwrap();

    assert_eq!(
        driver.file_exists(&mut second, &tree, "b_dir"),
        FileStatus::DirectoryExists
    );
    assert_eq!(
        driver.file_exists(&mut second, &tree, "a_dir"),
        FileStatus::NotExist
    );
}
