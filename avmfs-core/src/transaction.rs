//! Transaction manager interface.

use crate::error::TransactionError;

/// A scoped unit of work against the store.
pub trait Transaction: Send {
    fn is_read_only(&self) -> bool;

    fn commit(self: Box<Self>) -> Result<(), TransactionError>;

    fn rollback(self: Box<Self>) -> Result<(), TransactionError>;
}

/// Begins transactions.
pub trait TransactionManager: Send + Sync {
    fn begin(&self, read_only: bool) -> Result<Box<dyn Transaction>, TransactionError>;
}
