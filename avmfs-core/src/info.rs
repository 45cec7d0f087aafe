//! File information as reported to the protocol layer.

use std::ops::BitOr;

use chrono::{DateTime, Utc};

use crate::store::NodeDescriptor;

/// File attribute bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttributes(pub u32);

impl FileAttributes {
    pub const NORMAL: FileAttributes = FileAttributes(0x00);
    pub const READ_ONLY: FileAttributes = FileAttributes(0x01);
    pub const HIDDEN: FileAttributes = FileAttributes(0x02);
    pub const SYSTEM: FileAttributes = FileAttributes(0x04);
    pub const DIRECTORY: FileAttributes = FileAttributes(0x10);
    pub const ARCHIVE: FileAttributes = FileAttributes(0x20);

    pub fn contains(self, other: FileAttributes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FileAttributes {
    type Output = FileAttributes;

    fn bitor(self, rhs: FileAttributes) -> FileAttributes {
        FileAttributes(self.0 | rhs.0)
    }
}

/// Names that are always reported hidden, compared case-insensitively.
const HIDDEN_NAMES: &[&str] = &["Desktop.ini", "Thumbs.db"];

fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') || HIDDEN_NAMES.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Round a file length up to the allocation unit.
pub fn allocation_size(length: u64) -> u64 {
    (length + 512) & !511
}

/// Result of an existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    NotExist,
    FileExists,
    DirectoryExists,
}

/// Metadata for one file or directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub allocation_size: u64,
    pub attributes: FileAttributes,
    pub create_time: DateTime<Utc>,
    pub modify_time: DateTime<Utc>,
    pub access_time: DateTime<Utc>,
}

impl FileInfo {
    /// Project a store node; `read_only` marks every entry of a non-HEAD mount.
    pub fn from_node(node: &NodeDescriptor, read_only: bool) -> Self {
        let mut attributes = FileAttributes::NORMAL;
        let (size, allocation) = if node.is_directory() {
            attributes = attributes | FileAttributes::DIRECTORY;
            (0, 0)
        } else {
            (node.length, allocation_size(node.length))
        };

        if is_hidden_name(&node.name) {
            attributes = attributes | FileAttributes::HIDDEN;
        }
        if read_only {
            attributes = attributes | FileAttributes::READ_ONLY;
        }

        Self {
            name: node.name.clone(),
            size,
            allocation_size: allocation,
            attributes,
            create_time: node.create_time,
            modify_time: node.modify_time,
            access_time: node.access_time,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(FileAttributes::READ_ONLY)
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes.contains(FileAttributes::HIDDEN)
    }
}

/// Changes requested through `set_file_information`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileInfoUpdate {
    pub delete_on_close: Option<bool>,
    pub modify_time: Option<DateTime<Utc>>,
    pub attributes: Option<FileAttributes>,
}

impl FileInfoUpdate {
    pub fn delete_on_close() -> Self {
        Self {
            delete_on_close: Some(true),
            ..Self::default()
        }
    }
}
