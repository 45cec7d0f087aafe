//! VersionedStore trait - the storage service the driver delegates to.

use std::collections::BTreeMap;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version number of the live, writable state of a store.
pub const VERSION_HEAD: i32 = -1;

/// Failures reported by a versioned store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("wrong type: {0}")]
    WrongType(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of a store node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
}

/// Snapshot of a node's metadata as seen at a particular version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Absolute store path (`store:/a/b`).
    pub path: String,
    /// Last path component; empty for a store root.
    pub name: String,
    pub kind: NodeKind,
    /// Content length in bytes, zero for directories.
    pub length: u64,
    /// Version the descriptor was read from.
    pub version: i32,
    pub access_time: DateTime<Utc>,
    pub create_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
}

impl NodeDescriptor {
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

/// Byte sink returned when a file is created.
///
/// Content written is only guaranteed to reach the store once `close`
/// returns successfully.
pub trait ContentWriter: Write + Send {
    fn close(self: Box<Self>) -> StoreResult<()>;
}

/// Versioned storage service addressed by absolute store paths.
///
/// Paths have the form `store:/dir/name`. Mutating operations always act
/// on the HEAD version; reads take an explicit version.
pub trait VersionedStore: Send + Sync {
    /// Look up a node. Absence is `Ok(None)`, not an error.
    fn lookup(&self, version: i32, path: &str) -> StoreResult<Option<NodeDescriptor>>;

    /// Immediate children of a directory node, ordered by name.
    fn directory_listing(
        &self,
        node: &NodeDescriptor,
    ) -> StoreResult<BTreeMap<String, NodeDescriptor>>;

    /// Children of the directory at `path`, or `None` if there is no
    /// directory there.
    fn directory_listing_at(
        &self,
        version: i32,
        path: &str,
    ) -> StoreResult<Option<Vec<NodeDescriptor>>> {
        match self.lookup(version, path)? {
            Some(node) if node.is_directory() => {
                Ok(Some(self.directory_listing(&node)?.into_values().collect()))
            }
            _ => Ok(None),
        }
    }

    /// Create a directory `name` under `parent`.
    fn create_directory(&self, parent: &str, name: &str) -> StoreResult<()>;

    /// Create an empty file `name` under `parent`, returning a writer for
    /// its initial content.
    fn create_file(&self, parent: &str, name: &str) -> StoreResult<Box<dyn ContentWriter>>;

    /// Full content of a file at the given version.
    fn read_content(&self, version: i32, path: &str) -> StoreResult<Vec<u8>>;

    /// Replace the content of a HEAD file.
    fn write_content(&self, path: &str, data: &[u8]) -> StoreResult<()>;

    /// Remove a file or directory (with everything below it).
    fn remove_node(&self, path: &str) -> StoreResult<()>;

    /// Move `src_parent/src_name` to `dst_parent/dst_name`.
    fn rename(
        &self,
        src_parent: &str,
        src_name: &str,
        dst_parent: &str,
        dst_name: &str,
    ) -> StoreResult<()>;

    /// Create a new, empty store.
    fn create_store(&self, name: &str) -> StoreResult<()>;

    /// Freeze the current HEAD of a store, returning the new version id.
    fn create_snapshot(&self, store: &str) -> StoreResult<i32>;
}
