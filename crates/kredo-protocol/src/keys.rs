//! Pubkey and signature string handling.
//!
//! All identities on the wire are `ed25519:` followed by lowercase hex:
//! 64 characters (32 bytes) for public keys, 128 characters (64 bytes)
//! for signatures. Uppercase hex is rejected so that a given key has
//! exactly one printable form.

use ed25519_dalek::{Signature, VerifyingKey};

use crate::error::VerifyError;

/// Prefix shared by pubkey and signature strings.
pub const KEY_PREFIX: &str = "ed25519:";

/// Hex length of the pubkey portion (32 bytes).
pub const PUBKEY_HEX_LEN: usize = 64;

/// Hex length of the signature portion (64 bytes).
pub const SIGNATURE_HEX_LEN: usize = 128;

fn is_lower_hex(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Check whether a string is a well-formed pubkey (`ed25519:` + 64 lowercase hex).
#[must_use]
pub fn is_valid_pubkey(s: &str) -> bool {
    s.strip_prefix(KEY_PREFIX)
        .is_some_and(|hex| hex.len() == PUBKEY_HEX_LEN && is_lower_hex(hex))
}

/// Check whether a string is a well-formed signature (`ed25519:` + 128 lowercase hex).
#[must_use]
pub fn is_valid_signature(s: &str) -> bool {
    s.strip_prefix(KEY_PREFIX)
        .is_some_and(|hex| hex.len() == SIGNATURE_HEX_LEN && is_lower_hex(hex))
}

/// Decode a pubkey string into an Ed25519 verifying key.
///
/// # Errors
///
/// Returns a [`VerifyError`] naming which structural rule failed.
pub fn decode_verifying_key(pubkey: &str) -> Result<VerifyingKey, VerifyError> {
    let hex_part = pubkey
        .strip_prefix(KEY_PREFIX)
        .ok_or(VerifyError::PubkeyPrefix)?;
    if hex_part.len() != PUBKEY_HEX_LEN || !is_lower_hex(hex_part) {
        return Err(VerifyError::PubkeyFormat);
    }
    let bytes = hex::decode(hex_part).map_err(|_| VerifyError::PubkeyFormat)?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| VerifyError::PubkeyFormat)?;
    VerifyingKey::from_bytes(&arr).map_err(|_| VerifyError::PubkeyDecode)
}

/// Decode a signature string into an Ed25519 signature.
///
/// # Errors
///
/// Returns a [`VerifyError`] naming which structural rule failed.
pub fn decode_signature(signature: &str) -> Result<Signature, VerifyError> {
    let hex_part = signature
        .strip_prefix(KEY_PREFIX)
        .ok_or(VerifyError::SignaturePrefix)?;
    if hex_part.len() != SIGNATURE_HEX_LEN || !is_lower_hex(hex_part) {
        return Err(VerifyError::SignatureFormat);
    }
    let bytes = hex::decode(hex_part).map_err(|_| VerifyError::SignatureFormat)?;
    let arr: [u8; 64] = bytes.try_into().map_err(|_| VerifyError::SignatureFormat)?;
    Ok(Signature::from_bytes(&arr))
}

/// Format a verifying key as an `ed25519:`-prefixed pubkey string.
#[must_use]
pub fn encode_pubkey(key: &VerifyingKey) -> String {
    format!("{KEY_PREFIX}{}", hex::encode(key.to_bytes()))
}
