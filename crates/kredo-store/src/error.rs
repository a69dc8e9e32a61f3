//! Error types for store operations.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An attestation id was submitted twice.
    #[error("attestation id already exists and cannot be overwritten: {0}")]
    DuplicateAttestation(String),

    /// A requested row does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of row was looked up.
        kind: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// The caller's pubkey does not have the role required for this change.
    #[error("{0}")]
    PermissionDenied(String),

    /// The write conflicts with existing state (duplicate id, wrong
    /// state-machine phase, second active owner, ...).
    #[error("{0}")]
    Conflict(String),

    /// The input is malformed at the store boundary.
    #[error("{0}")]
    InvalidInput(String),

    /// A taxonomy domain or skill lookup failed.
    #[error("{0}")]
    Taxonomy(String),

    /// The underlying database failed after exhausting retries.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored JSON failed to parse back into a document.
    #[error("stored document is corrupt: {0}")]
    CorruptDocument(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
