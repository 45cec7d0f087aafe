//! AVM disk driver.
//!
//! Maps protocol-level filesystem operations onto a `VersionedStore`. Every
//! operation builds a store path from the share-relative path, makes sure the
//! session has a suitable transaction, calls the store and translates store
//! failures through an `ErrorMap`.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::auth::{AuthenticationContext, LocalAuthentication};
use crate::context::{MountConfig, MountContext};
use crate::error::{AvmError, AvmResult, ErrorMap};
use crate::file::{AccessMode, AvmNetworkFile, OpenParams, SeekType};
use crate::info::{FileAttributes, FileInfo, FileInfoUpdate, FileStatus};
use crate::mimetype::{ContentTypeGuesser, ExtensionMimetypes};
use crate::path::{build_store_path, join_store_path, split_path};
use crate::search::{contains_wildcards, SearchContext, WildCard};
use crate::session::{Session, TreeConnection};
use crate::store::{MemoryStore, StoreError, VersionedStore, VERSION_HEAD};
use crate::transaction::TransactionManager;

/// Filesystem driver over a versioned store.
pub struct AvmDiskDriver {
    store: Arc<dyn VersionedStore>,
    transactions: Arc<dyn TransactionManager>,
    auth: Arc<dyn AuthenticationContext>,
    mimetypes: Arc<dyn ContentTypeGuesser>,
}

/// Collects the driver's collaborators.
#[derive(Default)]
pub struct AvmDiskDriverBuilder {
    store: Option<Arc<dyn VersionedStore>>,
    transactions: Option<Arc<dyn TransactionManager>>,
    auth: Option<Arc<dyn AuthenticationContext>>,
    mimetypes: Option<Arc<dyn ContentTypeGuesser>>,
}

impl AvmDiskDriverBuilder {
    pub fn store(mut self, store: Arc<dyn VersionedStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transactions(mut self, transactions: Arc<dyn TransactionManager>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn authentication(mut self, auth: Arc<dyn AuthenticationContext>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn mimetypes(mut self, mimetypes: Arc<dyn ContentTypeGuesser>) -> Self {
        self.mimetypes = Some(mimetypes);
        self
    }

    /// Build the driver. Fails if any collaborator is missing.
    pub fn build(self) -> AvmResult<AvmDiskDriver> {
        fn required<T: ?Sized>(svc: Option<Arc<T>>, name: &str) -> AvmResult<Arc<T>> {
            svc.ok_or_else(|| AvmError::Configuration(format!("Driver missing service: {}", name)))
        }

        Ok(AvmDiskDriver {
            store: required(self.store, "versioned store")?,
            transactions: required(self.transactions, "transaction manager")?,
            auth: required(self.auth, "authentication context")?,
            mimetypes: required(self.mimetypes, "content type guesser")?,
        })
    }
}

/// Message used when wrapping a setup failure.
fn setup_message(err: &AvmError) -> String {
    match err {
        AvmError::Configuration(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn store_failure(err: StoreError) -> AvmError {
    AvmError::Io(err.to_string())
}

impl AvmDiskDriver {
    pub fn builder() -> AvmDiskDriverBuilder {
        AvmDiskDriverBuilder::default()
    }

    /// Driver over an in-memory store with local authentication and
    /// extension-based content types.
    pub fn with_memory_store(store: &MemoryStore) -> Self {
        Self {
            store: Arc::new(store.clone()),
            transactions: Arc::new(store.transactions()),
            auth: Arc::new(LocalAuthentication::default()),
            mimetypes: Arc::new(ExtensionMimetypes),
        }
    }

    pub fn store(&self) -> &dyn VersionedStore {
        self.store.as_ref()
    }

    fn begin(&self, sess: &mut Session, read_only: bool) -> AvmResult<()> {
        sess.begin_transaction(self.transactions.as_ref(), read_only)
    }

    // ==================== Mount ====================

    /// Validate the mount configuration and create the mount context.
    ///
    /// Runs as the system user inside its own write transaction. Any failure
    /// is reported as `AvmError::Setup`.
    pub fn create_context(&self, config: &MountConfig) -> AvmResult<MountContext> {
        self.setup_context(config).map_err(|e| {
            error!("Error during create context: {}", e);
            AvmError::Setup(setup_message(&e))
        })
    }

    fn setup_context(&self, config: &MountConfig) -> AvmResult<MountContext> {
        self.auth.set_current_user(&self.auth.system_user_name())?;

        let tx = self.transactions.begin(false)?;
        match self.resolve_mount(config) {
            Ok(ctx) => {
                tx.commit()?;
                debug!(store = %ctx.store_path(), version = ctx.version(), "mount context created");
                Ok(ctx)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!("Failed to rollback transaction: {}", rollback);
                }
                Err(e)
            }
        }
    }

    fn resolve_mount(&self, config: &MountConfig) -> AvmResult<MountContext> {
        let store_path = config.resolved_store_path()?;
        let version = config.resolved_version()?;

        let root = self.store.lookup(version, store_path).map_err(store_failure)?;
        if root.is_none() {
            if !config.create_store || version != VERSION_HEAD {
                return Err(AvmError::Configuration(format!(
                    "Invalid store path/version, {} ({})",
                    store_path, version
                )));
            }

            self.create_store_path(store_path)?;

            if self
                .store
                .lookup(version, store_path)
                .map_err(store_failure)?
                .is_none()
            {
                return Err(AvmError::Configuration(format!(
                    "Failed to create new store {}",
                    store_path
                )));
            }
        }

        Ok(MountContext::new(store_path, version))
    }

    /// Create the store named by `store_path` and any directories below its root.
    fn create_store_path(&self, store_path: &str) -> AvmResult<()> {
        let (store_name, sub_path) = store_path.split_once(":/").unwrap_or((store_path, ""));
        debug!(store = store_name, path = sub_path, "creating store");

        match self.store.create_store(store_name) {
            Ok(()) | Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => return Err(store_failure(e)),
        }

        let mut parent = format!("{}:/", store_name);
        for name in sub_path.split('/').filter(|c| !c.is_empty()) {
            match self.store.create_directory(&parent, name) {
                Ok(()) | Err(StoreError::AlreadyExists(_)) => {}
                Err(e) => return Err(store_failure(e)),
            }
            parent = join_store_path(&parent, name);
        }
        Ok(())
    }

    /// True when the mount is not writable, which is every version but HEAD.
    pub fn is_read_only(&self, ctx: &MountContext) -> bool {
        !ctx.is_head()
    }

    pub fn tree_opened(&self, sess: &Session, tree: &TreeConnection) {
        debug!(session = sess.name(), share = tree.share(), "tree opened");
    }

    pub fn tree_closed(&self, sess: &Session, tree: &TreeConnection) {
        debug!(session = sess.name(), share = tree.share(), "tree closed");
    }

    // ==================== Directories and metadata ====================

    pub fn create_directory(
        &self,
        sess: &mut Session,
        tree: &TreeConnection,
        params: &OpenParams,
    ) -> AvmResult<()> {
        let ctx = tree.context();
        if !ctx.is_head() {
            return Err(AvmError::AccessDenied(format!(
                "Cannot create {}, filesys not writable",
                params.path
            )));
        }

        let (parent, name) = split_path(&params.path);
        let store_path = build_store_path(ctx, &parent);
        debug!(path = %params.path, store_path = %store_path, name = %name, "create directory");

        self.begin(sess, false)?;
        self.store
            .create_directory(&store_path, &name)
            .map_err(|e| ErrorMap::CREATE.translate(&e, &params.path))
    }

    pub fn delete_directory(
        &self,
        sess: &mut Session,
        tree: &TreeConnection,
        dir: &str,
    ) -> AvmResult<()> {
        let ctx = tree.context();
        if !ctx.is_head() {
            return Err(AvmError::AccessDenied(format!(
                "Cannot delete {}, filesys not writable",
                dir
            )));
        }

        let store_path = build_store_path(ctx, dir);
        debug!(path = dir, store_path = %store_path, "delete directory");

        self.begin(sess, false)?;
        let map = ErrorMap::DELETE_DIRECTORY;
        let node = self
            .store
            .lookup(ctx.version(), &store_path)
            .map_err(|e| map.translate(&e, dir))?
            .ok_or_else(|| AvmError::FileNotFound(dir.to_string()))?;

        if !node.is_directory() {
            return Err(AvmError::Io(format!(
                "Delete directory path is not a directory, {}",
                dir
            )));
        }

        let children = self
            .store
            .directory_listing(&node)
            .map_err(|e| map.translate(&e, dir))?;
        if !children.is_empty() {
            return Err(AvmError::DirectoryNotEmpty(dir.to_string()));
        }

        self.store
            .remove_node(&store_path)
            .map_err(|e| map.translate(&e, dir))
    }

    pub fn delete_file(&self, sess: &mut Session, tree: &TreeConnection, name: &str) -> AvmResult<()> {
        let ctx = tree.context();
        if !ctx.is_head() {
            return Err(AvmError::AccessDenied(format!(
                "Cannot delete {}, filesys not writable",
                name
            )));
        }

        let store_path = build_store_path(ctx, name);
        debug!(path = name, store_path = %store_path, "delete file");

        self.begin(sess, false)?;
        let map = ErrorMap::DELETE_FILE;
        let node = self
            .store
            .lookup(ctx.version(), &store_path)
            .map_err(|e| map.translate(&e, name))?
            .ok_or_else(|| AvmError::FileNotFound(name.to_string()))?;

        if !node.is_file() {
            return Err(AvmError::Io(format!(
                "Delete file path is not a file, {}",
                name
            )));
        }

        self.store
            .remove_node(&store_path)
            .map_err(|e| map.translate(&e, name))
    }

    /// Check whether a path exists. Failures are logged and reported as absent.
    pub fn file_exists(&self, sess: &mut Session, tree: &TreeConnection, name: &str) -> FileStatus {
        let ctx = tree.context();
        let store_path = build_store_path(ctx, name);
        debug!(path = name, store_path = %store_path, "file exists check");

        if let Err(e) = self.begin(sess, true) {
            warn!(path = name, "file exists check failed: {}", e);
            return FileStatus::NotExist;
        }

        match self.store.lookup(ctx.version(), &store_path) {
            Ok(Some(node)) if node.is_directory() => FileStatus::DirectoryExists,
            Ok(Some(_)) => FileStatus::FileExists,
            Ok(None) => FileStatus::NotExist,
            Err(e) => {
                warn!(path = name, "file exists check failed: {}", e);
                FileStatus::NotExist
            }
        }
    }

    pub fn get_file_information(
        &self,
        sess: &mut Session,
        tree: &TreeConnection,
        name: &str,
    ) -> AvmResult<Option<FileInfo>> {
        let ctx = tree.context();
        let store_path = build_store_path(ctx, name);
        debug!(path = name, store_path = %store_path, "get file information");

        self.begin(sess, true)?;
        let info = self
            .store
            .lookup(ctx.version(), &store_path)
            .map_err(|e| ErrorMap::OPEN.translate(&e, name))?
            .map(|node| FileInfo::from_node(&node, !ctx.is_head()));

        if let Some(info) = &info {
            debug!(path = name, size = info.size, attributes = info.attributes.0, "file info");
        }
        Ok(info)
    }

    /// Validate a metadata change. Only delete-on-close is checked; the
    /// protocol layer marks the open handle itself.
    pub fn set_file_information(
        &self,
        _sess: &mut Session,
        tree: &TreeConnection,
        name: &str,
        update: &FileInfoUpdate,
    ) -> AvmResult<()> {
        debug!(path = name, ?update, "set file information");
        if update.delete_on_close == Some(true) && !tree.context().is_head() {
            return Err(AvmError::AccessDenied(
                "Store not writable, cannot set delete on close".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rename_file(
        &self,
        sess: &mut Session,
        tree: &TreeConnection,
        old_name: &str,
        new_name: &str,
    ) -> AvmResult<()> {
        let ctx = tree.context();
        let (old_parent, old_leaf) = split_path(old_name);
        let (new_parent, new_leaf) = split_path(new_name);
        let old_parent = build_store_path(ctx, &old_parent);
        let new_parent = build_store_path(ctx, &new_parent);

        debug!(
            from = %old_parent,
            from_name = %old_leaf,
            to = %new_parent,
            to_name = %new_leaf,
            "rename"
        );

        if !ctx.is_head() {
            return Err(AvmError::AccessDenied(format!(
                "Cannot rename {}, filesys not writable",
                old_name
            )));
        }

        self.begin(sess, false)?;
        self.store
            .rename(&old_parent, &old_leaf, &new_parent, &new_leaf)
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => ErrorMap::RENAME.translate(&e, new_name),
                _ => ErrorMap::RENAME.translate(&e, old_name),
            })
    }

    // ==================== File handles ====================

    pub fn create_file(
        &self,
        sess: &mut Session,
        tree: &TreeConnection,
        params: &OpenParams,
    ) -> AvmResult<AvmNetworkFile> {
        let ctx = tree.context();
        if !ctx.is_head() {
            return Err(AvmError::AccessDenied(format!(
                "Cannot create {}, filesys not writable",
                params.path
            )));
        }

        let (parent, name) = split_path(&params.path);
        let store_path = build_store_path(ctx, &parent);
        debug!(path = %params.path, store_path = %store_path, name = %name, "create file");

        self.begin(sess, false)?;
        let map = ErrorMap::CREATE;
        let writer = self
            .store
            .create_file(&store_path, &name)
            .map_err(|e| map.translate(&e, &params.path))?;
        writer.close().map_err(|e| map.translate(&e, &params.path))?;

        let file_path = build_store_path(ctx, &params.path);
        let node = self
            .store
            .lookup(ctx.version(), &file_path)
            .map_err(|e| map.translate(&e, &params.path))?
            .ok_or_else(|| AvmError::FileNotFound(params.path.clone()))?;

        Ok(
            AvmNetworkFile::new(node, file_path, ctx.version(), &params.path, AccessMode::ReadWrite)
                .with_content_type(self.mimetypes.guess(&name))
                .with_size_limit(ctx.disk_info().free_bytes()),
        )
    }

    pub fn open_file(
        &self,
        sess: &mut Session,
        tree: &TreeConnection,
        params: &OpenParams,
    ) -> AvmResult<AvmNetworkFile> {
        let ctx = tree.context();
        let store_path = build_store_path(ctx, &params.path);
        debug!(path = %params.path, access = ?params.access, store_path = %store_path, "open file");

        self.begin(sess, true)?;
        let node = self
            .store
            .lookup(ctx.version(), &store_path)
            .map_err(|e| ErrorMap::OPEN.translate(&e, &params.path))?
            .ok_or_else(|| AvmError::FileNotFound(params.path.clone()))?;

        if !ctx.is_head() && params.access.wants_write() {
            return Err(AvmError::AccessDenied(format!(
                "File {} is read-only",
                params.path
            )));
        }

        let granted = if params.access == AccessMode::ReadOnly || !ctx.is_head() {
            AccessMode::ReadOnly
        } else {
            AccessMode::ReadWrite
        };

        Ok(
            AvmNetworkFile::new(node, store_path, ctx.version(), &params.path, granted)
                .with_content_type(self.mimetypes.guess(&params.path))
                .with_size_limit(ctx.disk_info().free_bytes()),
        )
    }

    /// Close a handle, storing pending writes and honouring delete-on-close.
    pub fn close_file(
        &self,
        sess: &mut Session,
        tree: &TreeConnection,
        mut file: AvmNetworkFile,
    ) -> AvmResult<()> {
        debug!(path = file.full_name(), "close file");

        if file.is_dirty() {
            self.begin(sess, false)?;
        }
        file.close(self.store.as_ref())?;

        if file.delete_on_close() {
            if file.is_directory() {
                self.delete_directory(sess, tree, file.full_name())?;
            } else {
                self.delete_file(sess, tree, file.full_name())?;
            }
        }
        Ok(())
    }

    /// Read from `offset` into `buf`. Returns 0 at end of file.
    pub fn read_file(
        &self,
        sess: &mut Session,
        _tree: &TreeConnection,
        file: &mut AvmNetworkFile,
        buf: &mut [u8],
        offset: u64,
    ) -> AvmResult<usize> {
        if file.is_directory() {
            return Err(AvmError::AccessDenied(format!(
                "Cannot read directory {}",
                file.full_name()
            )));
        }
        if !file.has_content_channel() {
            self.begin(sess, true)?;
        }
        file.read_at(self.store.as_ref(), buf, offset)
    }

    /// Write `data` at `offset`. Returns the number of bytes written.
    pub fn write_file(
        &self,
        sess: &mut Session,
        _tree: &TreeConnection,
        file: &mut AvmNetworkFile,
        data: &[u8],
        offset: u64,
    ) -> AvmResult<usize> {
        if file.is_directory() {
            return Err(AvmError::AccessDenied(format!(
                "Cannot write directory {}",
                file.full_name()
            )));
        }
        self.begin(sess, false)?;
        file.write_at(self.store.as_ref(), data, offset)
    }

    pub fn seek_file(
        &self,
        sess: &mut Session,
        _tree: &TreeConnection,
        file: &mut AvmNetworkFile,
        pos: i64,
        whence: SeekType,
    ) -> AvmResult<u64> {
        if file.is_directory() {
            return Err(AvmError::AccessDenied(format!(
                "Cannot seek directory {}",
                file.full_name()
            )));
        }
        if !file.has_content_channel() {
            self.begin(sess, true)?;
        }
        file.seek(self.store.as_ref(), pos, whence)
    }

    pub fn truncate_file(
        &self,
        sess: &mut Session,
        _tree: &TreeConnection,
        file: &mut AvmNetworkFile,
        size: u64,
    ) -> AvmResult<()> {
        if file.is_directory() {
            return Err(AvmError::AccessDenied(format!(
                "Cannot truncate directory {}",
                file.full_name()
            )));
        }
        self.begin(sess, false)?;
        file.truncate(self.store.as_ref(), size)
    }

    pub fn flush_file(
        &self,
        sess: &mut Session,
        _tree: &TreeConnection,
        file: &mut AvmNetworkFile,
    ) -> AvmResult<()> {
        if file.is_dirty() {
            self.begin(sess, false)?;
        }
        file.flush(self.store.as_ref())
    }

    // ==================== Search ====================

    /// Start a directory search. Returns `None` when nothing matches.
    ///
    /// The attribute filter is not applied.
    pub fn start_search(
        &self,
        sess: &mut Session,
        tree: &TreeConnection,
        path: &str,
        attributes: FileAttributes,
    ) -> AvmResult<Option<SearchContext>> {
        let ctx = tree.context();
        debug!(path, attributes = attributes.0, "start search");

        self.begin(sess, true)?;
        let read_only = !ctx.is_head();

        if contains_wildcards(path) {
            let (dir, pattern) = split_path(path);
            let store_path = build_store_path(ctx, &dir);

            let entries = self
                .store
                .directory_listing_at(ctx.version(), &store_path)
                .map_err(|e| ErrorMap::OPEN.translate(&e, path))?;

            match entries {
                Some(entries) if !entries.is_empty() => {
                    debug!(count = entries.len(), "wildcard search listing");
                    let filter = WildCard::new(&pattern)?;
                    Ok(Some(SearchContext::listing(entries, filter, read_only)))
                }
                _ => Ok(None),
            }
        } else {
            let store_path = build_store_path(ctx, path);
            let node = self
                .store
                .lookup(ctx.version(), &store_path)
                .map_err(|e| ErrorMap::OPEN.translate(&e, path))?;
            Ok(node.map(|n| SearchContext::single(FileInfo::from_node(&n, read_only))))
        }
    }
}
