//! Protocol-side handles: sessions and tree connections.
//!
//! A `Session` carries the transaction that driver operations run in. A
//! `TreeConnection` binds a share name to the mount context created for it.

use tracing::{debug, warn};

use crate::context::MountContext;
use crate::error::AvmResult;
use crate::transaction::{Transaction, TransactionManager};

/// Client session; owns at most one active transaction.
pub struct Session {
    name: String,
    active: Option<Box<dyn Transaction>>,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if a transaction is active.
    pub fn has_transaction(&self) -> bool {
        self.active.is_some()
    }

    /// Check if the active transaction (if any) is read-only.
    pub fn is_read_only_transaction(&self) -> bool {
        self.active.as_ref().is_some_and(|tx| tx.is_read_only())
    }

    /// Make sure a transaction of at least the requested strength is active.
    ///
    /// An active write transaction satisfies any request. An active
    /// read-only transaction satisfies read requests; a write request
    /// commits it and begins a write transaction.
    pub fn begin_transaction(
        &mut self,
        manager: &dyn TransactionManager,
        read_only: bool,
    ) -> AvmResult<()> {
        if let Some(tx) = &self.active {
            if read_only || !tx.is_read_only() {
                return Ok(());
            }
            debug!(session = %self.name, "upgrading read-only transaction");
            self.end_transaction()?;
        }

        self.active = Some(manager.begin(read_only)?);
        Ok(())
    }

    /// Commit the active transaction.
    pub fn end_transaction(&mut self) -> AvmResult<()> {
        if let Some(tx) = self.active.take() {
            tx.commit()?;
        }
        Ok(())
    }

    /// Roll back the active transaction.
    pub fn abort_transaction(&mut self) -> AvmResult<()> {
        if let Some(tx) = self.active.take() {
            tx.rollback()?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(tx) = self.active.take() {
            if let Err(e) = tx.rollback() {
                warn!(session = %self.name, "Failed to rollback transaction: {}", e);
            }
        }
    }
}

/// A share connected to a mount.
#[derive(Debug, Clone)]
pub struct TreeConnection {
    share: String,
    context: MountContext,
}

impl TreeConnection {
    pub fn new(share: impl Into<String>, context: MountContext) -> Self {
        Self {
            share: share.into(),
            context,
        }
    }

    pub fn share(&self) -> &str {
        &self.share
    }

    pub fn context(&self) -> &MountContext {
        &self.context
    }
}
