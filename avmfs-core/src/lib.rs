//! AVM filesystem driver core
//!
//! This crate presents a versioned document store as a network-shareable
//! filesystem:
//! - Mount setup from share configuration, bound to one store version
//! - Path translation from protocol paths to store paths
//! - File, directory and search operations with store error translation
//! - Transaction scoping per client session
//!
//! # Architecture
//!
//! The driver delegates to collaborators behind traits:
//! - `VersionedStore`: the store service (`MemoryStore` in memory)
//! - `TransactionManager`: transaction scopes for each session
//! - `AuthenticationContext`: identity used during mount setup
//! - `ContentTypeGuesser`: content types for opened files
//!
//! Only the HEAD version of a store is writable. Mounting any other version
//! gives a read-only view of that snapshot.

pub mod auth;
pub mod context;
pub mod driver;
pub mod error;
pub mod file;
pub mod info;
pub mod mimetype;
pub mod path;
pub mod search;
pub mod seed;
pub mod session;
pub mod store;
pub mod transaction;

pub use auth::{AuthenticationContext, LocalAuthentication};
pub use context::{ConfigValue, DiskInfo, FilesystemAttributes, MountConfig, MountContext};
pub use driver::{AvmDiskDriver, AvmDiskDriverBuilder};
pub use error::{AvmError, AvmResult, ErrorMap, Outcome, TransactionError};
pub use file::{AccessMode, AvmNetworkFile, OpenParams, SeekType};
pub use info::{allocation_size, FileAttributes, FileInfo, FileInfoUpdate, FileStatus};
pub use mimetype::{ContentTypeGuesser, ExtensionMimetypes};
pub use path::{build_store_path, join_store_path, split_path, PROTOCOL_SEPARATOR, STORE_SEPARATOR};
pub use search::{contains_wildcards, SearchContext, WildCard};
pub use seed::{load_seed, load_seed_from_path, SeedManifest, StoreSeed};
pub use session::{Session, TreeConnection};
pub use store::{
    ContentWriter, MemoryStore, MemoryTransactionManager, NodeDescriptor, NodeKind, StoreError,
    StoreResult, VersionedStore, VERSION_HEAD,
};
pub use transaction::{Transaction, TransactionManager};
