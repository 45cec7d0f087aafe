//! avmfs - Browse and edit versioned stores through the AVM disk driver.
//!
//! Usage:
//!   avmfs [options] <command> [args]
//!
//! Examples:
//!   avmfs --image site.json --seed skeleton.zip ls
//!   avmfs --image site.json put index.html \index.html
//!   avmfs --image site.json snapshot
//!   avmfs --image site.json --at-version 1 cat \index.html
//!   avmfs --image site.json --store web:/www --create-store mkdir docs

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use avmfs_core::{
    contains_wildcards, load_seed, AvmDiskDriver, AvmError, AvmResult, FileAttributes,
    FileInfo, FileStatus, MemoryStore, MountConfig, OpenParams, Session, StoreError,
    TreeConnection, VersionedStore,
};

/// AVM filesystem CLI
#[derive(Parser, Debug)]
#[command(name = "avmfs")]
#[command(about = "Browse and edit versioned AVM stores")]
struct Args {
    /// Store image (JSON) to load, written back after changes
    #[arg(long)]
    image: Option<PathBuf>,

    /// Seed ZIP archives applied before the command runs
    #[arg(long)]
    seed: Vec<PathBuf>,

    /// Store path to mount
    #[arg(long, default_value = "main:/")]
    store: String,

    /// Mount a snapshot version instead of HEAD
    #[arg(long, allow_negative_numbers = true)]
    at_version: Option<i32>,

    /// Create the store if it does not exist
    #[arg(long)]
    create_store: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// List a directory or the entries matching a wildcard pattern
    Ls { pattern: Option<String> },
    /// Show file information
    Stat { path: String },
    /// Print file content
    Cat { path: String },
    /// Copy a local file into the store
    Put { local: PathBuf, path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file
    Rm { path: String },
    /// Delete an empty directory
    Rmdir { path: String },
    /// Rename or move a file or directory
    Mv { from: String, to: String },
    /// Freeze the current HEAD as a new version
    Snapshot,
}

impl Command {
    fn modifies_store(&self) -> bool {
        !matches!(self, Command::Ls { .. } | Command::Stat { .. } | Command::Cat { .. })
    }
}

/// Result of a command, printed once the driver work is done.
enum Output {
    Listing(Vec<FileInfo>),
    Info(FileInfo),
    Content(Vec<u8>),
    Snapshot(i32),
    Done,
}

/// Initialize tracing subscriber; `RUST_LOG` takes precedence.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Create the store a seed targets if it is missing.
fn ensure_store(store: &MemoryStore, store_path: &str) -> AvmResult<()> {
    let name = store_path
        .split_once(":/")
        .map(|(name, _)| name)
        .unwrap_or(store_path);
    match store.create_store(name) {
        Ok(()) | Err(StoreError::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(AvmError::Seed(e.to_string())),
    }
}

/// Turn an `ls` argument into a search path.
fn search_path(
    driver: &AvmDiskDriver,
    sess: &mut Session,
    tree: &TreeConnection,
    pattern: Option<&str>,
) -> String {
    let pattern = pattern.unwrap_or("").trim_end_matches(['\\', '/']);
    if pattern.is_empty() {
        return "*".to_string();
    }
    if !contains_wildcards(pattern)
        && driver.file_exists(sess, tree, pattern) == FileStatus::DirectoryExists
    {
        return format!("{}\\*", pattern);
    }
    pattern.to_string()
}

fn run_command(
    driver: &AvmDiskDriver,
    sess: &mut Session,
    tree: &TreeConnection,
    command: Command,
    upload: Option<Vec<u8>>,
) -> AvmResult<Output> {
    match command {
        Command::Ls { pattern } => {
            let path = search_path(driver, sess, tree, pattern.as_deref());
            let entries: Vec<FileInfo> = driver
                .start_search(sess, tree, &path, FileAttributes::NORMAL)?
                .map(|ctx| ctx.collect())
                .unwrap_or_default();
            Ok(Output::Listing(entries))
        }
        Command::Stat { path } => driver
            .get_file_information(sess, tree, &path)?
            .map(Output::Info)
            .ok_or(AvmError::FileNotFound(path)),
        Command::Cat { path } => {
            let mut file = driver.open_file(sess, tree, &OpenParams::read(&path))?;
            let mut content = Vec::new();
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = driver.read_file(sess, tree, &mut file, &mut buf, content.len() as u64)?;
                if n == 0 {
                    break;
                }
                content.extend_from_slice(&buf[..n]);
            }
            driver.close_file(sess, tree, file)?;
            Ok(Output::Content(content))
        }
        Command::Put { path, .. } => {
            let data = upload.unwrap_or_default();
            let mut file = match driver.file_exists(sess, tree, &path) {
                FileStatus::FileExists => {
                    let mut file = driver.open_file(sess, tree, &OpenParams::read_write(&path))?;
                    driver.truncate_file(sess, tree, &mut file, 0)?;
                    file
                }
                _ => driver.create_file(sess, tree, &OpenParams::read_write(&path))?,
            };
            driver.write_file(sess, tree, &mut file, &data, 0)?;
            driver.close_file(sess, tree, file)?;
            Ok(Output::Done)
        }
        Command::Mkdir { path } => {
            driver.create_directory(sess, tree, &OpenParams::read_write(&path))?;
            Ok(Output::Done)
        }
        Command::Rm { path } => {
            driver.delete_file(sess, tree, &path)?;
            Ok(Output::Done)
        }
        Command::Rmdir { path } => {
            driver.delete_directory(sess, tree, &path)?;
            Ok(Output::Done)
        }
        Command::Mv { from, to } => {
            driver.rename_file(sess, tree, &from, &to)?;
            Ok(Output::Done)
        }
        Command::Snapshot => {
            let ctx = tree.context();
            if driver.is_read_only(ctx) {
                return Err(AvmError::AccessDenied(
                    "Snapshots are taken from HEAD".to_string(),
                ));
            }
            sess.end_transaction()?;
            let store = ctx
                .store_path()
                .split_once(":/")
                .map(|(name, _)| name)
                .unwrap_or(ctx.store_path());
            let version = driver
                .store()
                .create_snapshot(store)
                .map_err(|e| AvmError::Io(e.to_string()))?;
            Ok(Output::Snapshot(version))
        }
    }
}

fn print_entry(info: &FileInfo) {
    let flags = format!(
        "{}{}{}",
        if info.is_directory() { 'd' } else { '-' },
        if info.is_read_only() { 'r' } else { 'w' },
        if info.is_hidden() { 'h' } else { '-' },
    );
    let name = if info.is_directory() {
        format!("{}", info.name.as_str().blue().bold())
    } else {
        info.name.clone()
    };
    println!(
        "{} {:>10} {} {}",
        flags,
        info.size,
        info.modify_time.format("%Y-%m-%d %H:%M"),
        name
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    // Load the store image, or start empty
    let mut store = MemoryStore::new();
    if let Some(path) = &args.image {
        if tokio::fs::try_exists(path).await? {
            let bytes = tokio::fs::read(path).await?;
            store = MemoryStore::load_image(&bytes)?;
            debug!(image = %path.display(), stores = ?store.store_names(), "loaded image");
        }
    }

    // Apply seeds
    let mut seeded = false;
    for path in &args.seed {
        let bytes = tokio::fs::read(path).await?;
        let seed = load_seed(Cursor::new(bytes))?;
        let target = seed.target(&args.store).to_string();
        ensure_store(&store, &target)?;
        let snapshot = seed.apply(&store, &target)?;
        eprintln!(
            "Seeded {} from {} ({} files)",
            target,
            path.display(),
            seed.files.len()
        );
        if let Some(version) = snapshot {
            eprintln!("Snapshot version {}", version);
        }
        seeded = true;
    }

    // Mount
    let mut config = MountConfig::new(args.store.clone());
    if let Some(version) = args.at_version {
        config = config.with_version(version);
    }
    if args.create_store {
        config = config.with_create_store();
    }

    let driver = Arc::new(AvmDiskDriver::with_memory_store(&store));
    let ctx = {
        let driver = Arc::clone(&driver);
        tokio::task::spawn_blocking(move || driver.create_context(&config)).await??
    };
    info!(store = %ctx.store_path(), version = ctx.version(), "mounted");

    // Read local upload data before entering the driver
    let upload = match &args.command {
        Command::Put { local, .. } => Some(tokio::fs::read(local).await?),
        _ => None,
    };

    let command = args.command.clone();
    let modifies = command.modifies_store() || seeded || args.create_store;
    let output = {
        let driver = Arc::clone(&driver);
        tokio::task::spawn_blocking(move || {
            let tree = TreeConnection::new("avmfs", ctx);
            let mut sess = Session::new("cli");
            driver.tree_opened(&sess, &tree);

            let result = run_command(&driver, &mut sess, &tree, command, upload);
            let finished = match &result {
                Ok(_) => sess.end_transaction(),
                Err(_) => sess.abort_transaction(),
            };

            driver.tree_closed(&sess, &tree);
            finished.and(result)
        })
        .await??
    };

    match output {
        Output::Listing(entries) => {
            for entry in &entries {
                print_entry(entry);
            }
        }
        Output::Info(info) => {
            println!("Name:       {}", info.name);
            println!("Size:       {}", info.size);
            println!("Allocation: {}", info.allocation_size);
            println!("Attributes: 0x{:02X}", info.attributes.0);
            println!("Created:    {}", info.create_time.to_rfc3339());
            println!("Modified:   {}", info.modify_time.to_rfc3339());
            println!("Accessed:   {}", info.access_time.to_rfc3339());
        }
        Output::Content(content) => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&content).await?;
            stdout.flush().await?;
        }
        Output::Snapshot(version) => println!("{}", version),
        Output::Done => {}
    }

    // Persist changes
    if modifies {
        if let Some(path) = &args.image {
            let bytes = store.save_image()?;
            tokio::fs::write(path, bytes).await?;
            debug!(image = %path.display(), "saved image");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mounted() -> (AvmDiskDriver, TreeConnection) {
        let store = MemoryStore::with_store("main");
        let driver = AvmDiskDriver::with_memory_store(&store);
        let ctx = driver.create_context(&MountConfig::new("main:/")).unwrap();
        (driver, TreeConnection::new("test", ctx))
    }

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "avmfs",
            "--image",
            "site.json",
            "--at-version",
            "-1",
            "mv",
            "a.txt",
            "b.txt",
        ])
        .unwrap();
        assert_eq!(args.store, "main:/");
        assert_eq!(args.at_version, Some(-1));
        assert!(matches!(args.command, Command::Mv { .. }));
        assert!(args.command.modifies_store());
    }

    #[test]
    fn test_search_path() {
        let (driver, tree) = mounted();
        let mut sess = Session::new("test");
        run_command(
            &driver,
            &mut sess,
            &tree,
            Command::Mkdir {
                path: "docs".to_string(),
            },
            None,
        )
        .unwrap();

        assert_eq!(search_path(&driver, &mut sess, &tree, None), "*");
        assert_eq!(search_path(&driver, &mut sess, &tree, Some("docs\\")), "docs\\*");
        assert_eq!(search_path(&driver, &mut sess, &tree, Some("*.txt")), "*.txt");
        assert_eq!(search_path(&driver, &mut sess, &tree, Some("a.txt")), "a.txt");
    }

    #[test]
    fn test_put_then_cat() {
        let (driver, tree) = mounted();
        let mut sess = Session::new("test");
        let put = Command::Put {
            local: PathBuf::from("local.txt"),
            path: "\\notes.txt".to_string(),
        };
        run_command(&driver, &mut sess, &tree, put.clone(), Some(b"first".to_vec())).unwrap();
        run_command(&driver, &mut sess, &tree, put, Some(b"2nd".to_vec())).unwrap();

        let cat = Command::Cat {
            path: "\\notes.txt".to_string(),
        };
        match run_command(&driver, &mut sess, &tree, cat, None).unwrap() {
            Output::Content(content) => assert_eq!(content, b"2nd"),
            _ => panic!("expected content"),
        }
    }
}
