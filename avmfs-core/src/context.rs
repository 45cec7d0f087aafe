//! Mount configuration and the per-mount context.

use serde::{Deserialize, Serialize};

use crate::error::{AvmError, AvmResult};
use crate::store::VERSION_HEAD;

/// Configuration key for the store path.
pub const KEY_STORE: &str = "storePath";
/// Configuration key for the store version.
pub const KEY_VERSION: &str = "version";
/// Configuration key for the create-store flag.
pub const KEY_CREATE: &str = "createStore";

/// A configuration value given either as a JSON number or as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Number(i64),
    Text(String),
}

/// Mount parameters, as supplied by the share configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountConfig {
    #[serde(default)]
    pub store_path: Option<String>,
    #[serde(default)]
    pub version: Option<ConfigValue>,
    #[serde(default)]
    pub create_store: bool,
}

impl MountConfig {
    pub fn new(store_path: impl Into<String>) -> Self {
        Self {
            store_path: Some(store_path.into()),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = Some(ConfigValue::Number(version.into()));
        self
    }

    pub fn with_create_store(mut self) -> Self {
        self.create_store = true;
        self
    }

    /// Parse from a JSON object such as `{"storePath": "main:/", "version": "3"}`.
    pub fn from_json(text: &str) -> AvmResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The store path; must be present and non-empty.
    pub fn resolved_store_path(&self) -> AvmResult<&str> {
        match self.store_path.as_deref() {
            Some(path) if !path.is_empty() => Ok(path),
            _ => Err(AvmError::Configuration(format!(
                "Device missing init value: {}",
                KEY_STORE
            ))),
        }
    }

    /// The requested version, defaulting to HEAD.
    pub fn resolved_version(&self) -> AvmResult<i32> {
        let version = match &self.version {
            None => return Ok(VERSION_HEAD),
            Some(ConfigValue::Text(text)) if text.trim().is_empty() => {
                return Err(AvmError::Configuration(
                    "Store version not specified".to_string(),
                ))
            }
            Some(ConfigValue::Text(text)) => text.trim().parse::<i32>().map_err(|_| {
                AvmError::Configuration(format!("Invalid store version specified, {}", text))
            })?,
            Some(ConfigValue::Number(n)) => i32::try_from(*n).map_err(|_| {
                AvmError::Configuration(format!("Invalid store version specified, {}", n))
            })?,
        };

        if version < 0 && version != VERSION_HEAD {
            return Err(AvmError::Configuration(format!(
                "Invalid store version id specified, {}",
                version
            )));
        }
        Ok(version)
    }
}

/// Reported disk geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskInfo {
    pub total_units: u64,
    pub blocks_per_unit: u64,
    pub block_size: u64,
    pub free_units: u64,
}

impl DiskInfo {
    pub fn unit_size(&self) -> u64 {
        self.blocks_per_unit * self.block_size
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_units * self.unit_size()
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_units * self.unit_size()
    }
}

impl Default for DiskInfo {
    /// An 80Gb disk with 90% free space.
    fn default() -> Self {
        Self {
            total_units: 2_560_000,
            blocks_per_unit: 64,
            block_size: 512,
            free_units: 2_304_000,
        }
    }
}

/// Filesystem capability flags reported to the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilesystemAttributes(pub u32);

impl FilesystemAttributes {
    pub const CASE_SENSITIVE_SEARCH: u32 = 0x0000_0001;
    pub const CASE_PRESERVED_NAMES: u32 = 0x0000_0002;
    pub const UNICODE_ON_DISK: u32 = 0x0000_0004;

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

/// Per-mount state, created once by `AvmDiskDriver::create_context`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountContext {
    store_path: String,
    version: i32,
    disk_info: DiskInfo,
    attributes: FilesystemAttributes,
}

impl MountContext {
    pub fn new(store_path: impl Into<String>, version: i32) -> Self {
        Self {
            store_path: store_path.into(),
            version,
            disk_info: DiskInfo::default(),
            attributes: FilesystemAttributes(
                FilesystemAttributes::CASE_PRESERVED_NAMES
                    | FilesystemAttributes::UNICODE_ON_DISK
                    | FilesystemAttributes::CASE_SENSITIVE_SEARCH,
            ),
        }
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Only the HEAD version is writable.
    pub fn is_head(&self) -> bool {
        self.version == VERSION_HEAD
    }

    pub fn disk_info(&self) -> &DiskInfo {
        &self.disk_info
    }

    pub fn filesystem_attributes(&self) -> FilesystemAttributes {
        self.attributes
    }
}
