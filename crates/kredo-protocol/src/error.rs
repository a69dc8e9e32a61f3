//! Error types for protocol operations.

use thiserror::Error;

/// Errors that can occur while preparing or validating protocol documents.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Document failed shape or business-rule validation.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Signature or key material is structurally invalid or does not verify.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// Value could not be represented as canonical JSON.
    #[error("value is not representable as canonical JSON: {0}")]
    NotRepresentable(String),
}

/// Document validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// A pubkey field is not `ed25519:` + 64 lowercase hex characters.
    #[error("{field}: pubkey must be 'ed25519:' followed by 64 lowercase hex characters")]
    InvalidPubkey {
        /// Which field carried the bad pubkey.
        field: &'static str,
    },

    /// `expires` is not strictly after `issued`.
    #[error("expires must be after issued")]
    ExpiresBeforeIssued,

    /// `expires` is more than two years after `issued`.
    #[error("expires must be at most 2 years after issued")]
    ExpiryTooFar,

    /// A non-warning attestation is missing its `skill` field.
    #[error("{0} requires a skill field")]
    MissingSkill(&'static str),

    /// A behavioral warning is missing its `warning_category`.
    #[error("behavioral_warning requires warning_category")]
    MissingWarningCategory,

    /// A behavioral warning's evidence context is too short.
    #[error("behavioral_warning requires evidence context >= 100 characters")]
    WarningContextTooShort,

    /// A behavioral warning lacks a log/hash/payload artifact.
    #[error("behavioral_warning requires at least one log:, hash:, or payload: artifact")]
    WarningArtifactMissing,

    /// Proficiency is outside the 1-5 range.
    #[error("proficiency must be between 1 and 5")]
    InvalidProficiency,

    /// The document carries no signature.
    #[error("document must be signed (signature field required)")]
    MissingSignature,
}

/// Signature verification failures, each with a stable reason code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Pubkey does not start with `ed25519:`.
    #[error("pubkey must start with 'ed25519:'")]
    PubkeyPrefix,

    /// Pubkey hex portion is not 64 lowercase hex characters.
    #[error("pubkey hex portion must be 64 lowercase hex characters")]
    PubkeyFormat,

    /// Pubkey bytes do not decode to a valid Ed25519 point.
    #[error("pubkey is not a valid ed25519 verifying key")]
    PubkeyDecode,

    /// Signature does not start with `ed25519:`.
    #[error("signature must start with 'ed25519:'")]
    SignaturePrefix,

    /// Signature hex portion is not 128 lowercase hex characters.
    #[error("signature hex portion must be 128 lowercase hex characters")]
    SignatureFormat,

    /// The signature does not verify over the canonical payload.
    #[error("signature verification failed")]
    Mismatch,
}

impl VerifyError {
    /// Stable machine-readable reason code for API responses and audit rows.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            VerifyError::PubkeyPrefix => "pubkey_prefix",
            VerifyError::PubkeyFormat => "pubkey_format",
            VerifyError::PubkeyDecode => "pubkey_decode",
            VerifyError::SignaturePrefix => "signature_prefix",
            VerifyError::SignatureFormat => "signature_format",
            VerifyError::Mismatch => "signature_mismatch",
        }
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
