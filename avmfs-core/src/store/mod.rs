//! Versioned store abstractions.
//!
//! - `VersionedStore`: storage service interface the driver delegates to
//! - `MemoryStore`: in-memory implementation with snapshots and transactions

mod memory_store;
mod versioned_store;

pub use memory_store::{MemoryStore, MemoryTransactionManager};
pub use versioned_store::{
    ContentWriter, NodeDescriptor, NodeKind, StoreError, StoreResult, VersionedStore, VERSION_HEAD,
};
