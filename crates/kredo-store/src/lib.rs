//! # kredo-store
//!
//! Transactional SQLite persistence for the Kredo discovery service.
//!
//! The store exclusively owns all persistent state: the known-key
//! registry, append-only attestations/revocations/disputes, the ownership
//! state machine, integrity baselines and checks, the audit log, the
//! taxonomy, and the document pin index. Every other component takes
//! read-only snapshots or issues writes through this crate's API.
//!
//! Writes are short serialized transactions: uniqueness/state-machine
//! checks, the row insert, and the audit row all commit atomically, then
//! registered commit hooks are notified with the affected pubkeys so
//! derived caches can invalidate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod attestations;
pub mod audit;
pub mod error;
pub mod integrity;
mod migrations;
pub mod ownership;
pub mod pins;
pub mod profile;
pub mod registry;
pub mod store;
pub mod taxonomy;

// Re-export main types
pub use attestations::{AttestationFilter, AttestorSummary, StoredAttestation, SubjectSummary};
pub use audit::{hash_ip, AuditEvent, AuditFilter, SourceAnomaly};
pub use error::{Result, StoreError};
pub use integrity::{diff_manifests, FileHash, IntegrityBaseline, IntegrityCheck, IntegrityDiff};
pub use ownership::OwnershipClaim;
pub use pins::PinRecord;
pub use profile::{ProfileBundle, TrustNetworkEntry, WarningRow};
pub use registry::{RegisterOutcome, RegistrationView};
pub use store::{
    AuditContext, CommitEvent, CommitHook, EvidenceScores, KredoStore, Page, DEFAULT_PAGE_LIMIT,
    MAX_PAGE_LIMIT,
};
pub use taxonomy::{DomainEntry, TaxonomySnapshot, TAXONOMY_VERSION};
