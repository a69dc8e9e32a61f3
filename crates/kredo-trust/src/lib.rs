//! # kredo-trust
//!
//! Evidence scoring and trust analysis for the Kredo discovery service.
//!
//! Provides:
//! - Evidence quality scoring across four dimensions
//! - Exponential age decay of attestation weight
//! - Ring detection (mutual pairs, Bron–Kerbosch cliques) with discounts
//! - Depth-bounded recursive attestor reputation
//! - Per-subject analysis and network health statistics
//! - Accountability tiers, the integrity run-gate, and deployability
//! - A short-TTL cache invalidated by store commit hooks
//!
//! Everything here is a pure computation over a [`TrustSnapshot`] taken
//! from the store; nothing mutates persistent state.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod analysis;
pub mod cache;
pub mod decay;
pub mod evidence;
pub mod gate;
pub mod reputation;
pub mod rings;
pub mod snapshot;

// Re-export main types
pub use analysis::{analyze_subject, network_health, NetworkHealth, SubjectAnalysis, WeightedSkill};
pub use cache::{analysis_key, profile_key, TrustCache, DEFAULT_TTL_SECONDS, NETWORK_HEALTH_KEY, RINGS_KEY};
pub use decay::{half_life_decay, issued_decay, DECAY_HALF_LIFE_DAYS};
pub use evidence::{score_evidence, EvidenceScore, WARNING_MIN_COMPOSITE};
pub use gate::{
    accountability, classify_diff, deployability, integrity_gate, Accountability, CheckSummary,
    IntegrityGate, TrafficLight, HUMAN_LINKED_MULTIPLIER, RED_THRESHOLD, UNLINKED_MULTIPLIER,
};
pub use reputation::{
    attestation_weight, attestor_reputation, AttestationWeight, BASE_REPUTATION_WEIGHT,
    MAX_REPUTATION_DEPTH,
};
pub use rings::{
    detect_rings, ring_discount, RingInfo, RingType, CLIQUE_DISCOUNT, MUTUAL_PAIR_DISCOUNT,
};
pub use snapshot::{TrustAttestation, TrustSnapshot};
