//! # kredo-protocol
//!
//! Document models, canonical serialization, and Ed25519 signature
//! verification for the Kredo attestation protocol.
//!
//! Provides:
//! - Canonical JSON encoding matching the cross-client signing contract
//! - Attestation, revocation, and dispute document models with validation
//! - Pubkey/signature string parsing (`ed25519:` + lowercase hex)
//! - Pure signature verification (this crate never signs)
//!
//! ## Signing contract
//!
//! Every signed document is verified against the canonical encoding of its
//! *signable view*: the document with the `signature` field removed,
//! `null` values dropped, object keys sorted, and the result encoded as
//! compact ASCII-only JSON. Three independent clients (server, CLI,
//! browser) must agree on these bytes byte-for-byte, so the rules in
//! [`canonical`] are contractual.
//!
//! ## Example
//!
//! ```
//! use kredo_protocol::canonical::canonical_bytes;
//! use serde_json::json;
//!
//! let doc = json!({"b": 1, "a": "x", "drop": null});
//! let bytes = canonical_bytes(&doc).unwrap();
//! assert_eq!(bytes, br#"{"a":"x","b":1}"#);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod canonical;
pub mod documents;
pub mod error;
pub mod keys;
pub mod time;
pub mod verify;

// Re-export main types
pub use canonical::{canonical_bytes, canonical_value, signable_view};
pub use documents::{
    ActorType, Attestation, AttestationType, Attestor, Dispute, DocumentKind, Evidence,
    Revocation, Skill, Subject, WarningCategory, PROTOCOL_VERSION,
};
pub use error::{DocumentError, ProtocolError, VerifyError};
pub use keys::{is_valid_pubkey, is_valid_signature, KEY_PREFIX, PUBKEY_HEX_LEN, SIGNATURE_HEX_LEN};
pub use verify::{verify_payload, verify_signed_value};
