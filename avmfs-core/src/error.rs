//! Error types for the AVM filesystem driver.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced to the protocol layer by driver operations.
#[derive(Error, Debug)]
pub enum AvmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File exists: {0}")]
    FileExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Generic I/O failure; the message carries the offending path.
    #[error("{0}")]
    Io(String),

    #[error("Driver setup error, {0}")]
    Setup(String),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Seed error: {0}")]
    Seed(String),

    #[error("I/O error: {0}")]
    System(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for driver operations.
pub type AvmResult<T> = Result<T, AvmError>;

/// Failure reported by a transaction manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransactionError(pub String);

/// Filesystem-level result of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    FileNotFound,
    FileExists,
    /// File exists, message is `"<prefix>, <path>"`.
    FileExistsWith(&'static str),
    /// Generic I/O error, message is `"<prefix>, <path>"`.
    Io(&'static str),
}

/// Per-operation translation of store failures into filesystem failures.
///
/// Every store error kind has an entry, so no store error reaches the
/// protocol layer untranslated. Lock poisoning always becomes an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorMap {
    pub not_found: Outcome,
    pub wrong_type: Outcome,
    pub exists: Outcome,
}

impl ErrorMap {
    /// Directory and file creation.
    pub const CREATE: ErrorMap = ErrorMap {
        not_found: Outcome::FileNotFound,
        wrong_type: Outcome::FileNotFound,
        exists: Outcome::FileExists,
    };

    /// Open and search lookups.
    pub const OPEN: ErrorMap = ErrorMap {
        not_found: Outcome::FileNotFound,
        wrong_type: Outcome::FileNotFound,
        exists: Outcome::FileExists,
    };

    pub const DELETE_DIRECTORY: ErrorMap = ErrorMap {
        not_found: Outcome::Io("Directory not found"),
        wrong_type: Outcome::Io("Invalid path"),
        exists: Outcome::Io("Invalid path"),
    };

    pub const DELETE_FILE: ErrorMap = ErrorMap {
        not_found: Outcome::Io("File not found"),
        wrong_type: Outcome::Io("Invalid path"),
        exists: Outcome::Io("Invalid path"),
    };

    /// Rename; callers pass the destination path for `AlreadyExists`
    /// and the source path otherwise.
    pub const RENAME: ErrorMap = ErrorMap {
        not_found: Outcome::Io("Source not found"),
        wrong_type: Outcome::Io("Invalid path"),
        exists: Outcome::FileExistsWith("Destination exists"),
    };

    /// Byte-level content access through an open handle.
    pub const CONTENT: ErrorMap = ErrorMap {
        not_found: Outcome::FileNotFound,
        wrong_type: Outcome::Io("Invalid path"),
        exists: Outcome::FileExists,
    };

    /// Look up the outcome for a store error.
    pub fn outcome(&self, err: &StoreError) -> Outcome {
        match err {
            StoreError::NotFound(_) => self.not_found,
            StoreError::WrongType(_) => self.wrong_type,
            StoreError::AlreadyExists(_) => self.exists,
            StoreError::LockPoisoned => Outcome::Io("Store unavailable"),
        }
    }

    /// Translate a store error, embedding `path` in the message.
    pub fn translate(&self, err: &StoreError, path: &str) -> AvmError {
        match self.outcome(err) {
            Outcome::FileNotFound => AvmError::FileNotFound(path.to_string()),
            Outcome::FileExists => AvmError::FileExists(path.to_string()),
            Outcome::FileExistsWith(prefix) => AvmError::FileExists(format!("{}, {}", prefix, path)),
            Outcome::Io(prefix) => AvmError::Io(format!("{}, {}", prefix, path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mapping() {
        let err = ErrorMap::CREATE.translate(&StoreError::AlreadyExists("x".into()), "\\docs");
        assert!(matches!(err, AvmError::FileExists(p) if p == "\\docs"));

        let err = ErrorMap::CREATE.translate(&StoreError::NotFound("x".into()), "\\docs");
        assert!(matches!(err, AvmError::FileNotFound(_)));

        let err = ErrorMap::CREATE.translate(&StoreError::WrongType("x".into()), "\\docs");
        assert!(matches!(err, AvmError::FileNotFound(_)));
    }

    #[test]
    fn test_delete_directory_mapping() {
        let err =
            ErrorMap::DELETE_DIRECTORY.translate(&StoreError::NotFound("x".into()), "\\old");
        assert_eq!(err.to_string(), "Directory not found, \\old");

        let err =
            ErrorMap::DELETE_DIRECTORY.translate(&StoreError::WrongType("x".into()), "\\old");
        assert_eq!(err.to_string(), "Invalid path, \\old");
    }

    #[test]
    fn test_rename_destination_exists() {
        let err = ErrorMap::RENAME.translate(&StoreError::AlreadyExists("x".into()), "\\b.txt");
        match err {
            AvmError::FileExists(msg) => assert_eq!(msg, "Destination exists, \\b.txt"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lock_poisoned_is_always_io() {
        for map in [
            ErrorMap::CREATE,
            ErrorMap::OPEN,
            ErrorMap::DELETE_DIRECTORY,
            ErrorMap::DELETE_FILE,
            ErrorMap::RENAME,
            ErrorMap::CONTENT,
        ] {
            let err = map.translate(&StoreError::LockPoisoned, "\\a");
            assert!(matches!(err, AvmError::Io(_)));
        }
    }
}
