//! Ledger error types.

use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A row with the same key already exists.
    ///
    /// Uid for principals, certificate digest for revocations.
    #[error("{table} row {key} already exists")]
    AlreadyExists {
        /// Table the insert targeted
        table: &'static str,
        /// Conflicting key
        key: String,
    },

    /// A conditional write found different state than expected.
    ///
    /// Another writer got there first. The caller's read is stale.
    #[error("conflict on {key}: {reason}")]
    Conflict {
        /// Row the condition was checked against
        key: String,
        /// What did not match
        reason: String,
    },

    /// Row encoding or decoding failed.
    ///
    /// Indicates corruption or a schema mismatch. Not transient.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    ///
    /// Transient - the same operation may succeed later.
    #[error("I/O error: {0}")]
    Io(String),

    /// A multi-step write stopped partway.
    ///
    /// `completed` names the steps that are durable.
    #[error("partial write after {completed}: {reason}")]
    PartialWrite {
        /// Durable steps
        completed: String,
        /// Failure that stopped the rest
        reason: String,
    },
}

impl StorageError {
    /// Retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<ciborium::de::Error<std::io::Error>> for StorageError {
    fn from(err: ciborium::de::Error<std::io::Error>) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for StorageError {
    fn from(err: ciborium::ser::Error<std::io::Error>) -> Self {
        Self::Serialization(err.to_string())
    }
}
