//! Open file handles.
//!
//! A handle reads the whole file content from the store the first time a
//! byte operation needs it. Writes go to that buffer and are stored back
//! on flush or close.

use tracing::debug;

use crate::context::DiskInfo;
use crate::error::{AvmError, AvmResult, ErrorMap};
use crate::store::{NodeDescriptor, VersionedStore, VERSION_HEAD};

/// Access requested by, or granted to, a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn wants_write(self) -> bool {
        self != AccessMode::ReadOnly
    }
}

/// Origin of a seek offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekType {
    Start,
    Current,
    End,
}

/// Parameters for `open_file`, `create_file` and `create_directory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenParams {
    /// Share-relative path using either separator.
    pub path: String,
    pub access: AccessMode,
}

impl OpenParams {
    pub fn new(path: impl Into<String>, access: AccessMode) -> Self {
        Self {
            path: path.into(),
            access,
        }
    }

    pub fn read(path: impl Into<String>) -> Self {
        Self::new(path, AccessMode::ReadOnly)
    }

    pub fn read_write(path: impl Into<String>) -> Self {
        Self::new(path, AccessMode::ReadWrite)
    }
}

#[derive(Debug)]
struct ContentChannel {
    data: Vec<u8>,
    dirty: bool,
}

/// An open file or directory.
#[derive(Debug)]
pub struct AvmNetworkFile {
    node: NodeDescriptor,
    store_path: String,
    version: i32,
    full_name: String,
    granted_access: AccessMode,
    content_type: Option<String>,
    delete_on_close: bool,
    channel: Option<ContentChannel>,
    position: u64,
    size_limit: u64,
}

impl AvmNetworkFile {
    pub fn new(
        node: NodeDescriptor,
        store_path: impl Into<String>,
        version: i32,
        full_name: impl Into<String>,
        granted_access: AccessMode,
    ) -> Self {
        Self {
            node,
            store_path: store_path.into(),
            version,
            full_name: full_name.into(),
            granted_access,
            content_type: None,
            delete_on_close: false,
            channel: None,
            position: 0,
            size_limit: DiskInfo::default().free_bytes(),
        }
    }

    /// Largest size the content may grow to through writes or truncation.
    pub fn with_size_limit(mut self, size_limit: u64) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn node(&self) -> &NodeDescriptor {
        &self.node
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Share-relative name the handle was opened with.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn granted_access(&self) -> AccessMode {
        self.granted_access
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn is_directory(&self) -> bool {
        self.node.is_directory()
    }

    pub fn delete_on_close(&self) -> bool {
        self.delete_on_close
    }

    pub fn set_delete_on_close(&mut self, delete: bool) {
        self.delete_on_close = delete;
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    /// Current length, including unflushed writes.
    pub fn file_size(&self) -> u64 {
        match &self.channel {
            Some(ch) => ch.data.len() as u64,
            None => self.node.length,
        }
    }

    pub fn has_content_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Check for writes not yet stored.
    pub fn is_dirty(&self) -> bool {
        self.channel.as_ref().is_some_and(|ch| ch.dirty)
    }

    fn channel(&mut self, store: &dyn VersionedStore) -> AvmResult<&mut ContentChannel> {
        if self.channel.is_none() {
            debug!(path = %self.store_path, version = self.version, "opening content channel");
            let data = store
                .read_content(self.version, &self.store_path)
                .map_err(|e| ErrorMap::CONTENT.translate(&e, &self.full_name))?;
            self.channel = Some(ContentChannel { data, dirty: false });
        }
        match self.channel.as_mut() {
            Some(ch) => Ok(ch),
            None => Err(AvmError::Io(format!("Content channel closed, {}", self.full_name))),
        }
    }

    fn out_of_range(&self) -> AvmError {
        AvmError::Io(format!("File offset out of range, {}", self.full_name))
    }

    /// Validate a content length against the size limit.
    fn checked_len(&self, len: u64) -> AvmResult<usize> {
        if len > self.size_limit {
            return Err(self.out_of_range());
        }
        usize::try_from(len).map_err(|_| self.out_of_range())
    }

    fn check_writable(&self) -> AvmResult<()> {
        if self.granted_access == AccessMode::ReadOnly || self.version != VERSION_HEAD {
            return Err(AvmError::AccessDenied(format!(
                "File {} is read-only",
                self.full_name
            )));
        }
        Ok(())
    }

    /// Read into `buf` from `offset`. Returns 0 at or past end of file.
    pub fn read_at(
        &mut self,
        store: &dyn VersionedStore,
        buf: &mut [u8],
        offset: u64,
    ) -> AvmResult<usize> {
        let ch = self.channel(store)?;
        let len = ch.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let count = buf.len().min(ch.data.len() - start);
        buf[..count].copy_from_slice(&ch.data[start..start + count]);
        self.position = offset + count as u64;
        Ok(count)
    }

    /// Write `data` at `offset`, zero-filling any gap past the current end.
    pub fn write_at(
        &mut self,
        store: &dyn VersionedStore,
        data: &[u8],
        offset: u64,
    ) -> AvmResult<usize> {
        self.check_writable()?;
        let end = u64::try_from(data.len())
            .ok()
            .and_then(|len| offset.checked_add(len))
            .ok_or_else(|| self.out_of_range())?;
        let end = self.checked_len(end)?;
        let start = end - data.len();
        let ch = self.channel(store)?;
        if ch.data.len() < end {
            ch.data.resize(end, 0);
        }
        ch.data[start..end].copy_from_slice(data);
        ch.dirty = true;
        self.position = end as u64;
        Ok(data.len())
    }

    /// Move the file position, returning the new absolute position.
    pub fn seek(
        &mut self,
        store: &dyn VersionedStore,
        offset: i64,
        whence: SeekType,
    ) -> AvmResult<u64> {
        let base = match whence {
            SeekType::Start => Some(0),
            SeekType::Current => i64::try_from(self.position).ok(),
            SeekType::End => i64::try_from(self.channel(store)?.data.len()).ok(),
        };
        let target = base
            .and_then(|base| base.checked_add(offset))
            .ok_or_else(|| self.out_of_range())?;
        if target < 0 {
            return Err(AvmError::Io(format!(
                "Seek before start of file, {}",
                self.full_name
            )));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    /// Resize the content and store it.
    pub fn truncate(&mut self, store: &dyn VersionedStore, size: u64) -> AvmResult<()> {
        self.check_writable()?;
        let len = self.checked_len(size)?;
        let ch = self.channel(store)?;
        ch.data.resize(len, 0);
        ch.dirty = true;
        if self.position > size {
            self.position = size;
        }
        self.flush(store)
    }

    /// Store buffered writes.
    pub fn flush(&mut self, store: &dyn VersionedStore) -> AvmResult<()> {
        let Some(ch) = self.channel.as_mut() else {
            return Ok(());
        };
        if !ch.dirty {
            return Ok(());
        }
        store
            .write_content(&self.store_path, &ch.data)
            .map_err(|e| ErrorMap::CONTENT.translate(&e, &self.full_name))?;
        ch.dirty = false;
        self.node.length = ch.data.len() as u64;
        Ok(())
    }

    /// Flush and release the content channel.
    pub fn close(&mut self, store: &dyn VersionedStore) -> AvmResult<()> {
        self.flush(store)?;
        self.channel = None;
        Ok(())
    }
}
