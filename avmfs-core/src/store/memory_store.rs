//! In-memory versioned store.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::versioned_store::{
    ContentWriter, NodeDescriptor, NodeKind, StoreError, StoreResult, VersionedStore,
    VERSION_HEAD,
};
use crate::error::{AvmError, AvmResult, TransactionError};
use crate::transaction::{Transaction, TransactionManager};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Timestamps {
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    accessed: DateTime<Utc>,
}

impl Timestamps {
    fn now() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            modified: now,
            accessed: now,
        }
    }

    fn touch(&mut self) {
        let now = Utc::now();
        self.modified = now;
        self.accessed = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileNode {
    content: Vec<u8>,
    times: Timestamps,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DirNode {
    children: BTreeMap<String, Node>,
    times: Timestamps,
}

impl DirNode {
    fn new() -> Self {
        Self {
            children: BTreeMap::new(),
            times: Timestamps::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Node {
    File(FileNode),
    Directory(DirNode),
}

/// Borrowed view of a node found by path.
enum Entry<'a> {
    File(&'a FileNode),
    Dir(&'a DirNode),
}

impl Entry<'_> {
    fn of(node: &Node) -> Entry<'_> {
        match node {
            Node::File(f) => Entry::File(f),
            Node::Directory(d) => Entry::Dir(d),
        }
    }

    fn describe(&self, store: &str, parts: &[&str], version: i32) -> NodeDescriptor {
        let (kind, length, times) = match self {
            Entry::File(f) => (NodeKind::File, f.content.len() as u64, &f.times),
            Entry::Dir(d) => (NodeKind::Directory, 0, &d.times),
        };
        NodeDescriptor {
            path: format!("{}:/{}", store, parts.join("/")),
            name: parts.last().map(|s| s.to_string()).unwrap_or_default(),
            kind,
            length,
            version,
            access_time: times.accessed,
            create_time: times.created,
            modify_time: times.modified,
        }
    }
}

/// One named store: the HEAD tree plus frozen snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    head: DirNode,
    snapshots: BTreeMap<i32, DirNode>,
    next_version: i32,
}

impl StoreState {
    /// A new store starts with an empty snapshot 0.
    fn new() -> Self {
        let head = DirNode::new();
        let mut snapshots = BTreeMap::new();
        snapshots.insert(0, head.clone());
        Self {
            head,
            snapshots,
            next_version: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryInner {
    stores: BTreeMap<String, StoreState>,
}

impl MemoryInner {
    fn tree(&self, store: &str, version: i32) -> Option<&DirNode> {
        let state = self.stores.get(store)?;
        if version == VERSION_HEAD {
            Some(&state.head)
        } else {
            state.snapshots.get(&version)
        }
    }

    fn head_mut(&mut self, store: &str, path: &str) -> StoreResult<&mut DirNode> {
        self.stores
            .get_mut(store)
            .map(|s| &mut s.head)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }
}

/// Split `store:/a/b` into the store name and its non-empty components.
fn split_store_path(path: &str) -> StoreResult<(&str, Vec<&str>)> {
    match path.split_once(":/") {
        Some((store, rest)) if !store.is_empty() => {
            Ok((store, rest.split('/').filter(|c| !c.is_empty()).collect()))
        }
        _ => Err(StoreError::NotFound(format!("malformed store path {}", path))),
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(StoreError::NotFound(format!("invalid name '{}'", name)));
    }
    Ok(())
}

fn child_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

fn find<'a>(root: &'a DirNode, parts: &[&str]) -> Option<Entry<'a>> {
    let Some((last, parents)) = parts.split_last() else {
        return Some(Entry::Dir(root));
    };
    let mut dir = root;
    for part in parents {
        match dir.children.get(*part)? {
            Node::Directory(d) => dir = d,
            Node::File(_) => return None,
        }
    }
    dir.children.get(*last).map(Entry::of)
}

fn dir_mut<'a>(root: &'a mut DirNode, parts: &[&str], path: &str) -> StoreResult<&'a mut DirNode> {
    let mut dir = root;
    for part in parts {
        dir = match dir.children.get_mut(*part) {
            Some(Node::Directory(d)) => d,
            Some(Node::File(_)) => return Err(StoreError::WrongType(path.to_string())),
            None => return Err(StoreError::NotFound(path.to_string())),
        };
    }
    Ok(dir)
}

fn write_head_content(inner: &RwLock<MemoryInner>, path: &str, data: &[u8]) -> StoreResult<()> {
    let (store, parts) = split_store_path(path)?;
    let Some((last, parents)) = parts.split_last() else {
        return Err(StoreError::WrongType(path.to_string()));
    };
    let mut inner = inner.write().map_err(|_| StoreError::LockPoisoned)?;
    let dir = dir_mut(inner.head_mut(store, path)?, parents, path)?;
    match dir.children.get_mut(*last) {
        Some(Node::File(f)) => {
            f.content = data.to_vec();
            f.times.touch();
            Ok(())
        }
        Some(Node::Directory(_)) => Err(StoreError::WrongType(path.to_string())),
        None => Err(StoreError::NotFound(path.to_string())),
    }
}

/// In-memory versioned store.
///
/// Holds any number of named stores, each with a writable HEAD tree and
/// read-only snapshots. Clone is cheap (just clones the Arc), so the same
/// state can back a driver, its transaction manager and test assertions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
    writer: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a single empty store.
    pub fn with_store(name: &str) -> Self {
        let mut inner = MemoryInner::default();
        inner.stores.insert(name.to_string(), StoreState::new());
        Self {
            inner: Arc::new(RwLock::new(inner)),
            writer: Arc::default(),
        }
    }

    /// Names of all stores.
    pub fn store_names(&self) -> Vec<String> {
        match self.inner.read() {
            Ok(inner) => inner.stores.keys().cloned().collect(),
            Err(_) => vec![],
        }
    }

    /// Snapshot versions of a store, ascending.
    pub fn snapshots(&self, store: &str) -> Vec<i32> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| {
                inner
                    .stores
                    .get(store)
                    .map(|s| s.snapshots.keys().copied().collect())
            })
            .unwrap_or_default()
    }

    /// Transaction manager whose rollbacks restore this store's state.
    ///
    /// All managers of one store share a single write slot.
    pub fn transactions(&self) -> MemoryTransactionManager {
        MemoryTransactionManager {
            inner: Arc::clone(&self.inner),
            writer: Arc::clone(&self.writer),
        }
    }

    /// Serialize every store (HEAD and snapshots) to JSON.
    pub fn save_image(&self) -> AvmResult<Vec<u8>> {
        let inner = self.inner.read().map_err(|_| AvmError::LockPoisoned)?;
        Ok(serde_json::to_vec_pretty(&*inner)?)
    }

    /// Restore a store set written by `save_image`.
    pub fn load_image(bytes: &[u8]) -> AvmResult<Self> {
        let inner: MemoryInner = serde_json::from_slice(bytes)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            writer: Arc::default(),
        })
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryInner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryInner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl VersionedStore for MemoryStore {
    fn lookup(&self, version: i32, path: &str) -> StoreResult<Option<NodeDescriptor>> {
        let Ok((store, parts)) = split_store_path(path) else {
            return Ok(None);
        };
        let inner = self.read()?;
        let Some(root) = inner.tree(store, version) else {
            return Ok(None);
        };
        Ok(find(root, &parts).map(|e| e.describe(store, &parts, version)))
    }

    fn directory_listing(
        &self,
        node: &NodeDescriptor,
    ) -> StoreResult<BTreeMap<String, NodeDescriptor>> {
        let (store, parts) = split_store_path(&node.path)?;
        let inner = self.read()?;
        let root = inner
            .tree(store, node.version)
            .ok_or_else(|| StoreError::NotFound(node.path.clone()))?;

        match find(root, &parts) {
            Some(Entry::Dir(dir)) => Ok(dir
                .children
                .iter()
                .map(|(name, child)| {
                    let child_parts: Vec<&str> = parts
                        .iter()
                        .copied()
                        .chain(std::iter::once(name.as_str()))
                        .collect();
                    let desc = Entry::of(child).describe(store, &child_parts, node.version);
                    (name.clone(), desc)
                })
                .collect()),
            Some(Entry::File(_)) => Err(StoreError::WrongType(node.path.clone())),
            None => Err(StoreError::NotFound(node.path.clone())),
        }
    }

    fn create_directory(&self, parent: &str, name: &str) -> StoreResult<()> {
        validate_name(name)?;
        let (store, parts) = split_store_path(parent)?;
        let mut inner = self.write()?;
        let dir = dir_mut(inner.head_mut(store, parent)?, &parts, parent)?;

        if dir.children.contains_key(name) {
            return Err(StoreError::AlreadyExists(child_path(parent, name)));
        }
        dir.children
            .insert(name.to_string(), Node::Directory(DirNode::new()));
        dir.times.touch();
        Ok(())
    }

    fn create_file(&self, parent: &str, name: &str) -> StoreResult<Box<dyn ContentWriter>> {
        validate_name(name)?;
        let (store, parts) = split_store_path(parent)?;
        {
            let mut inner = self.write()?;
            let dir = dir_mut(inner.head_mut(store, parent)?, &parts, parent)?;

            if dir.children.contains_key(name) {
                return Err(StoreError::AlreadyExists(child_path(parent, name)));
            }
            dir.children.insert(
                name.to_string(),
                Node::File(FileNode {
                    content: Vec::new(),
                    times: Timestamps::now(),
                }),
            );
            dir.times.touch();
        }

        Ok(Box::new(MemoryContentWriter {
            inner: Arc::clone(&self.inner),
            path: child_path(parent, name),
            buffer: Vec::new(),
        }))
    }

    fn read_content(&self, version: i32, path: &str) -> StoreResult<Vec<u8>> {
        let (store, parts) = split_store_path(path)?;
        let inner = self.read()?;
        let root = inner
            .tree(store, version)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        match find(root, &parts) {
            Some(Entry::File(f)) => Ok(f.content.clone()),
            Some(Entry::Dir(_)) => Err(StoreError::WrongType(path.to_string())),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }

    fn write_content(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        write_head_content(&self.inner, path, data)
    }

    fn remove_node(&self, path: &str) -> StoreResult<()> {
        let (store, parts) = split_store_path(path)?;
        let Some((last, parents)) = parts.split_last() else {
            return Err(StoreError::WrongType(path.to_string()));
        };
        let mut inner = self.write()?;
        let dir = dir_mut(inner.head_mut(store, path)?, parents, path)?;

        dir.children
            .remove(*last)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        dir.times.touch();
        Ok(())
    }

    fn rename(
        &self,
        src_parent: &str,
        src_name: &str,
        dst_parent: &str,
        dst_name: &str,
    ) -> StoreResult<()> {
        validate_name(dst_name)?;
        let (src_store, src_parts) = split_store_path(src_parent)?;
        let (dst_store, dst_parts) = split_store_path(dst_parent)?;
        let src_path = child_path(src_parent, src_name);

        if src_store != dst_store {
            return Err(StoreError::WrongType(format!(
                "cannot rename across stores, {} to {}",
                src_path, dst_parent
            )));
        }

        let mut inner = self.write()?;
        let root = inner.head_mut(src_store, src_parent)?;

        // All checks run before anything moves.
        if !dir_mut(&mut *root, &src_parts, src_parent)?
            .children
            .contains_key(src_name)
        {
            return Err(StoreError::NotFound(src_path));
        }
        if dir_mut(&mut *root, &dst_parts, dst_parent)?
            .children
            .contains_key(dst_name)
        {
            return Err(StoreError::AlreadyExists(child_path(dst_parent, dst_name)));
        }
        let mut src_full = src_parts.clone();
        src_full.push(src_name);
        if dst_parts.starts_with(&src_full) {
            return Err(StoreError::WrongType(format!(
                "cannot move {} beneath itself",
                src_path
            )));
        }

        let src_dir = dir_mut(&mut *root, &src_parts, src_parent)?;
        let node = src_dir
            .children
            .remove(src_name)
            .ok_or_else(|| StoreError::NotFound(src_path.clone()))?;
        src_dir.times.touch();

        let dst_dir = dir_mut(&mut *root, &dst_parts, dst_parent)?;
        dst_dir.children.insert(dst_name.to_string(), node);
        dst_dir.times.touch();
        Ok(())
    }

    fn create_store(&self, name: &str) -> StoreResult<()> {
        if name.is_empty() || name.contains(':') || name.contains('/') {
            return Err(StoreError::NotFound(format!("invalid store name '{}'", name)));
        }
        let mut inner = self.write()?;
        if inner.stores.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        inner.stores.insert(name.to_string(), StoreState::new());
        Ok(())
    }

    fn create_snapshot(&self, store: &str) -> StoreResult<i32> {
        let mut inner = self.write()?;
        let state = inner
            .stores
            .get_mut(store)
            .ok_or_else(|| StoreError::NotFound(store.to_string()))?;

        let version = state.next_version;
        state.snapshots.insert(version, state.head.clone());
        state.next_version += 1;
        Ok(version)
    }
}

/// Buffers initial file content until closed.
struct MemoryContentWriter {
    inner: Arc<RwLock<MemoryInner>>,
    path: String,
    buffer: Vec<u8>,
}

impl Write for MemoryContentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContentWriter for MemoryContentWriter {
    fn close(self: Box<Self>) -> StoreResult<()> {
        write_head_content(&self.inner, &self.path, &self.buffer)
    }
}

/// Transactions over a `MemoryStore`.
///
/// At most one write transaction is open at a time. Beginning a second one
/// fails instead of waiting. A write transaction records the HEAD tree of
/// every store when it begins; rollback puts those trees back and drops
/// stores created since. Snapshots are never rolled back.
#[derive(Clone)]
pub struct MemoryTransactionManager {
    inner: Arc<RwLock<MemoryInner>>,
    writer: Arc<AtomicBool>,
}

impl TransactionManager for MemoryTransactionManager {
    fn begin(&self, read_only: bool) -> Result<Box<dyn Transaction>, TransactionError> {
        if read_only {
            return Ok(Box::new(MemoryTransaction {
                inner: Arc::clone(&self.inner),
                write: None,
            }));
        }

        let slot = WriteSlot::acquire(&self.writer)?;
        let heads = self
            .inner
            .read()
            .map_err(|_| TransactionError("store lock poisoned".to_string()))?
            .stores
            .iter()
            .map(|(name, state)| (name.clone(), state.head.clone()))
            .collect();
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            write: Some(WriteUndo { heads, _slot: slot }),
        }))
    }
}

/// Holds the store's single write slot until dropped.
struct WriteSlot {
    flag: Arc<AtomicBool>,
}

impl WriteSlot {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, TransactionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                TransactionError("Store busy, another write transaction is active".to_string())
            })?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for WriteSlot {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct WriteUndo {
    heads: BTreeMap<String, DirNode>,
    _slot: WriteSlot,
}

struct MemoryTransaction {
    inner: Arc<RwLock<MemoryInner>>,
    write: Option<WriteUndo>,
}

impl Transaction for MemoryTransaction {
    fn is_read_only(&self) -> bool {
        self.write.is_none()
    }

    fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        let MemoryTransaction { inner, write } = *self;
        let Some(mut undo) = write else {
            return Ok(());
        };
        let mut inner = inner
            .write()
            .map_err(|_| TransactionError("store lock poisoned".to_string()))?;
        inner.stores.retain(|name, _| undo.heads.contains_key(name));
        for (name, state) in inner.stores.iter_mut() {
            if let Some(head) = undo.heads.remove(name) {
                state.head = head;
            }
        }
        Ok(())
    }
}
