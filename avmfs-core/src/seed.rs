//! Store seeding from ZIP archives.
//!
//! A seed is a ZIP file whose directory and file entries become store nodes.
//! An optional `manifest.json` at the archive root describes the seed:
//!
//! ```json
//! { "store": "main:/www", "description": "Site skeleton", "snapshot": true }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zip::ZipArchive;

use crate::error::{AvmError, AvmResult};
use crate::path::join_store_path;
use crate::store::{StoreError, VersionedStore, VERSION_HEAD};

const MANIFEST_NAME: &str = "manifest.json";

/// Seed manifest schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedManifest {
    /// Store path the seed is meant for.
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Take a snapshot once the seed is applied.
    #[serde(default)]
    pub snapshot: bool,
}

/// Contents of a loaded seed archive. Paths are `/`-separated and relative.
#[derive(Debug, Clone, Default)]
pub struct StoreSeed {
    pub manifest: SeedManifest,
    pub directories: BTreeSet<String>,
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Normalize an archive entry name, rejecting entries that escape the root.
fn entry_path(name: &str) -> AvmResult<String> {
    let parts: Vec<&str> = name
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    if parts.contains(&"..") {
        return Err(AvmError::Seed(format!("Unsafe entry path, {}", name)));
    }
    Ok(parts.join("/"))
}

/// Split a relative path into its parent (possibly empty) and name.
fn split_relative(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

/// Load a seed from ZIP data.
pub fn load_seed<R: Read + Seek>(reader: R) -> AvmResult<StoreSeed> {
    let mut archive = ZipArchive::new(reader)?;
    let mut seed = StoreSeed::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let path = entry_path(entry.name())?;
        if path.is_empty() {
            continue;
        }

        if entry.is_dir() {
            seed.directories.insert(path);
            continue;
        }

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;

        if path == MANIFEST_NAME {
            seed.manifest = serde_json::from_slice(&content)?;
        } else {
            seed.files.insert(path, content);
        }
    }

    // Parents of files are implied directories
    let implied: Vec<String> = seed
        .files
        .keys()
        .chain(seed.directories.iter())
        .flat_map(|path| {
            let parts: Vec<&str> = path.split('/').collect();
            (1..parts.len())
                .map(|n| parts[..n].join("/"))
                .collect::<Vec<_>>()
        })
        .collect();
    seed.directories.extend(implied);

    debug!(
        directories = seed.directories.len(),
        files = seed.files.len(),
        "loaded seed"
    );
    Ok(seed)
}

/// Load a seed from a file path.
pub fn load_seed_from_path(path: &Path) -> AvmResult<StoreSeed> {
    let file = std::fs::File::open(path)?;
    load_seed(std::io::BufReader::new(file))
}

impl StoreSeed {
    /// Store path from the manifest, or `default` if it names none.
    pub fn target<'a>(&'a self, default: &'a str) -> &'a str {
        self.manifest.store.as_deref().unwrap_or(default)
    }

    /// Write the seed below `store_path` in HEAD.
    ///
    /// Existing directories are kept and existing files overwritten. Returns
    /// the snapshot version if the manifest asks for one.
    pub fn apply(&self, store: &dyn VersionedStore, store_path: &str) -> AvmResult<Option<i32>> {
        let failed = |path: &str, e: StoreError| AvmError::Seed(format!("{}: {}", path, e));

        // BTreeSet order puts every parent before its children
        for dir in &self.directories {
            let (parent, name) = split_relative(dir);
            match store.create_directory(&join_store_path(store_path, parent), name) {
                Ok(()) | Err(StoreError::AlreadyExists(_)) => {}
                Err(e) => return Err(failed(dir, e)),
            }
        }

        for (path, content) in &self.files {
            let full = join_store_path(store_path, path);
            match store.lookup(VERSION_HEAD, &full).map_err(|e| failed(path, e))? {
                Some(node) if node.is_file() => {
                    store
                        .write_content(&full, content)
                        .map_err(|e| failed(path, e))?;
                }
                Some(_) => {
                    return Err(AvmError::Seed(format!("Not a file, {}", path)));
                }
                None => {
                    let (parent, name) = split_relative(path);
                    let mut writer = store
                        .create_file(&join_store_path(store_path, parent), name)
                        .map_err(|e| failed(path, e))?;
                    writer.write_all(content)?;
                    writer.close().map_err(|e| failed(path, e))?;
                }
            }
        }

        if !self.manifest.snapshot {
            return Ok(None);
        }
        let store_name = store_path
            .split_once(":/")
            .map(|(name, _)| name)
            .unwrap_or(store_path);
        let version = store
            .create_snapshot(store_name)
            .map_err(|e| failed(store_name, e))?;
        debug!(store = store_name, version, "seed snapshot");
        Ok(Some(version))
    }
}
