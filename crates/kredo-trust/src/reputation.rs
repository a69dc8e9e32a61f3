//! Recursive attestor reputation and per-attestation effective weight.
//!
//! The effective weight of an attestation is
//! `proficiency x evidence_composite x decay x attestor_rep x ring_discount`.
//! Attestor reputation is the depth-bounded recursion
//! `R(p, 0) = 0`, `R(p, d) = 1 - exp(-sum of weights for p at depth d-1)`,
//! with a visited set breaking cycles. The 0.1 floor in `attestor_rep`
//! keeps a fresh attestor from contributing nothing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::decay::issued_decay;
use crate::evidence::score_evidence;
use crate::rings::{ring_discount, RingInfo};
use crate::snapshot::{TrustAttestation, TrustSnapshot};

/// Recursion depth for attestor reputation.
pub const MAX_REPUTATION_DEPTH: u32 = 3;

/// Reputation floor applied to every attestor.
pub const BASE_REPUTATION_WEIGHT: f64 = 0.1;

/// Decay level below which an attestation is flagged as decayed.
const DECAYED_FLAG_THRESHOLD: f64 = 0.25;

/// Attestor reputation below which the attestor is flagged as unattested.
const UNATTESTED_FLAG_THRESHOLD: f64 = 0.01;

/// Weight breakdown for a single attestation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttestationWeight {
    /// The attestation this weight describes.
    pub attestation_id: String,
    /// Claimed proficiency (1 for warnings).
    pub raw_proficiency: u8,
    /// Live evidence composite.
    pub evidence_quality: f64,
    /// Age decay factor.
    pub decay_factor: f64,
    /// Recursive reputation of the attestor.
    pub attestor_reputation: f64,
    /// Ring discount applied to this edge.
    pub ring_discount: f64,
    /// Product of all factors.
    pub effective_weight: f64,
    /// Advisory flags: `ring_member`, `decayed`, `unattested_attestor`.
    pub flags: Vec<String>,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn proficiency_of(att: &TrustAttestation) -> u8 {
    att.skill.as_ref().map_or(1, |s| s.proficiency)
}

fn live_composite(snapshot: &TrustSnapshot, att: &TrustAttestation) -> f64 {
    score_evidence(&att.evidence, att.skill.as_ref(), att.issued, snapshot.now()).composite
}

/// One attestation's contribution to its subject's reputation sum, with
/// the attestor's own reputation evaluated at `depth`.
fn contribution(
    snapshot: &TrustSnapshot,
    att: &TrustAttestation,
    depth: u32,
    visited: &HashSet<String>,
    rings: &[RingInfo],
) -> f64 {
    let attestor_rep = reputation_at_depth(snapshot, &att.attestor_pubkey, depth, visited, rings);
    let attestor_weight = BASE_REPUTATION_WEIGHT + (1.0 - BASE_REPUTATION_WEIGHT) * attestor_rep;
    let decay = issued_decay(att.issued, snapshot.now());
    let discount = ring_discount(&att.subject_pubkey, &att.attestor_pubkey, rings);
    let composite = live_composite(snapshot, att);
    f64::from(proficiency_of(att)) * composite * decay * attestor_weight * discount
}

fn reputation_at_depth(
    snapshot: &TrustSnapshot,
    pubkey: &str,
    depth: u32,
    visited: &HashSet<String>,
    rings: &[RingInfo],
) -> f64 {
    if depth == 0 || visited.contains(pubkey) {
        return 0.0;
    }
    let mut branch_visited = visited.clone();
    branch_visited.insert(pubkey.to_string());

    let mut total = 0.0;
    for att in snapshot.for_subject(pubkey) {
        total += contribution(snapshot, att, depth - 1, &branch_visited, rings);
    }
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - (-total).exp()
}

/// Reputation of a pubkey at full depth, in [0, 1].
#[must_use]
pub fn attestor_reputation(snapshot: &TrustSnapshot, pubkey: &str, rings: &[RingInfo]) -> f64 {
    reputation_at_depth(snapshot, pubkey, MAX_REPUTATION_DEPTH, &HashSet::new(), rings)
}

/// Full weight breakdown for one attestation.
#[must_use]
pub fn attestation_weight(
    snapshot: &TrustSnapshot,
    att: &TrustAttestation,
    rings: &[RingInfo],
) -> AttestationWeight {
    let evidence_quality = live_composite(snapshot, att);
    let decay_factor = issued_decay(att.issued, snapshot.now());
    let attestor_rep = attestor_reputation(snapshot, &att.attestor_pubkey, rings);
    let attestor_weight = BASE_REPUTATION_WEIGHT + (1.0 - BASE_REPUTATION_WEIGHT) * attestor_rep;
    let discount = ring_discount(&att.subject_pubkey, &att.attestor_pubkey, rings);
    let raw_proficiency = proficiency_of(att);
    let effective =
        f64::from(raw_proficiency) * evidence_quality * decay_factor * attestor_weight * discount;

    let mut flags = Vec::new();
    if discount < 1.0 {
        flags.push("ring_member".to_string());
    }
    if decay_factor < DECAYED_FLAG_THRESHOLD {
        flags.push("decayed".to_string());
    }
    if attestor_rep < UNATTESTED_FLAG_THRESHOLD {
        flags.push("unattested_attestor".to_string());
    }

    AttestationWeight {
        attestation_id: att.id.clone(),
        raw_proficiency,
        evidence_quality: round4(evidence_quality),
        decay_factor: round4(decay_factor),
        attestor_reputation: round4(attestor_rep),
        ring_discount: discount,
        effective_weight: round4(effective),
        flags,
    }
}
