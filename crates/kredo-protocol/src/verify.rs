//! Ed25519 signature verification.
//!
//! This service only ever verifies: signing happens on clients, and
//! private keys never touch the server. Verification is a pure function of
//! `(canonical bytes, signature, pubkey)`.

use ed25519_dalek::Verifier;
use serde_json::Value;

use crate::canonical::{canonical_value, signable_view};
use crate::error::VerifyError;
use crate::keys::{decode_signature, decode_verifying_key};

/// Verify an Ed25519 signature over raw payload bytes.
///
/// `pubkey` is `ed25519:` + 64 lowercase hex; `signature` is `ed25519:` +
/// 128 lowercase hex.
///
/// # Errors
///
/// Returns a [`VerifyError`] with a specific reason code for structural
/// problems, or [`VerifyError::Mismatch`] when the signature does not
/// verify.
pub fn verify_payload(message: &[u8], pubkey: &str, signature: &str) -> Result<(), VerifyError> {
    let key = decode_verifying_key(pubkey)?;
    let sig = decode_signature(signature)?;
    key.verify(message, &sig).map_err(|_| VerifyError::Mismatch)
}

/// Verify a signature over the canonical encoding of a JSON value.
///
/// Used for action payloads (ownership, integrity, taxonomy mutations)
/// where the signed message is an explicit field map rather than a stored
/// document.
///
/// # Errors
///
/// Same failure modes as [`verify_payload`].
pub fn verify_signed_value(payload: &Value, pubkey: &str, signature: &str) -> Result<(), VerifyError> {
    let message = canonical_value(payload);
    verify_payload(&message, pubkey, signature)
}

/// Verify a signature over a full document's signable view (the document
/// with its `signature` entry removed).
///
/// # Errors
///
/// Same failure modes as [`verify_payload`].
pub fn verify_signed_document(doc: &Value, pubkey: &str, signature: &str) -> Result<(), VerifyError> {
    let view = signable_view(doc);
    verify_signed_value(&view, pubkey, signature)
}
