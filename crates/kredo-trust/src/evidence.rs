//! Evidence quality scoring.
//!
//! Maps an attestation's evidence to four sub-scores and a weighted
//! composite, each in [0, 1]. Scoring is informational for skill
//! attestations; behavioral warnings must clear
//! [`WARNING_MIN_COMPOSITE`] at accept time.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use kredo_protocol::{Evidence, Skill};

use crate::decay::half_life_decay;

/// Composite weight for specificity.
pub const WEIGHT_SPECIFICITY: f64 = 0.30;

/// Composite weight for verifiability.
pub const WEIGHT_VERIFIABILITY: f64 = 0.30;

/// Composite weight for relevance.
pub const WEIGHT_RELEVANCE: f64 = 0.25;

/// Composite weight for recency.
pub const WEIGHT_RECENCY: f64 = 0.15;

/// Context length at which the specificity base saturates.
pub const SPECIFICITY_SATURATION_CHARS: f64 = 280.0;

/// Recency half-life in days.
pub const RECENCY_HALF_LIFE_DAYS: f64 = 180.0;

/// Minimum composite for a behavioral warning to be accepted.
pub const WARNING_MIN_COMPOSITE: f64 = 0.4;

/// Generic filler phrases that penalize specificity.
const FILLER_MARKERS: &[&str] = &[
    "great work",
    "very good",
    "awesome",
    "amazing",
    "excellent work",
    "nice job",
    "good job",
    "10/10",
];

/// Artifact categories that count as verifiable references.
const ARTIFACT_CATEGORIES: &[&str] = &[
    "chain", "log", "hash", "output", "pr", "commit", "report", "post",
];

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-z]+:[A-Za-z0-9-]+").expect("static regex")
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("static regex"));

static CATEGORY_ARTIFACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let categories = ARTIFACT_CATEGORIES.join("|");
    Regex::new(&format!(r"^(?:{categories}):\S+$")).expect("static regex")
});

static IPFS_ARTIFACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ipfs:(?:Qm|bafy)[A-Za-z0-9]+$").expect("static regex"));

/// Evidence quality across four dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceScore {
    /// Context detail: length, named entities, outcome.
    pub specificity: f64,
    /// Fraction of artifacts that are checkable references.
    pub verifiability: f64,
    /// Whether the evidence echoes the claimed skill.
    pub relevance: f64,
    /// How recent the attested interaction was.
    pub recency: f64,
    /// Weighted composite.
    pub composite: f64,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn score_specificity(evidence: &Evidence) -> f64 {
    let chars = evidence.context.chars().count() as f64;
    let mut score = 0.6 * (chars / SPECIFICITY_SATURATION_CHARS).min(1.0);

    // Named entities make the account checkable.
    if evidence.context.bytes().any(|b| b.is_ascii_digit()) {
        score += 0.1;
    }
    if IDENTIFIER_RE.is_match(&evidence.context) {
        score += 0.1;
    }
    if URL_RE.is_match(&evidence.context) {
        score += 0.1;
    }
    if !evidence.outcome.is_empty() {
        score += 0.1;
    }

    let lowered = evidence.context.to_lowercase();
    if FILLER_MARKERS.iter().any(|m| lowered.contains(m)) {
        score -= 0.15;
    }

    score.clamp(0.0, 1.0)
}

/// Whether a single artifact is a verifiable reference.
#[must_use]
pub fn is_verifiable_artifact(artifact: &str) -> bool {
    artifact.starts_with("http://")
        || artifact.starts_with("https://")
        || IPFS_ARTIFACT_RE.is_match(artifact)
        || CATEGORY_ARTIFACT_RE.is_match(artifact)
}

fn score_verifiability(evidence: &Evidence) -> f64 {
    if evidence.artifacts.is_empty() {
        return 0.0;
    }
    let matching = evidence
        .artifacts
        .iter()
        .filter(|a| is_verifiable_artifact(a))
        .count() as f64;
    matching / evidence.artifacts.len() as f64
}

fn score_relevance(evidence: &Evidence, skill: Option<&Skill>) -> f64 {
    // Warnings carry no skill; nothing to cross-check.
    let Some(skill) = skill else { return 1.0 };

    let haystack = {
        let mut h = evidence.context.to_lowercase();
        for artifact in &evidence.artifacts {
            h.push(' ');
            h.push_str(&artifact.to_lowercase());
        }
        h
    };

    // A whole-slug echo is full credit.
    if haystack.contains(&skill.domain) || haystack.contains(&skill.specific) {
        return 1.0;
    }

    // Otherwise, fraction of hyphen-split tokens echoed.
    let mut tokens: Vec<&str> = skill
        .domain
        .split('-')
        .chain(skill.specific.split('-'))
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    if tokens.is_empty() {
        return 0.0;
    }
    let matched = tokens.iter().filter(|t| haystack.contains(**t)).count() as f64;
    matched / tokens.len() as f64
}

fn score_recency(evidence: &Evidence, issued: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let reference = evidence.interaction_date.unwrap_or(issued);
    half_life_decay(reference, now, RECENCY_HALF_LIFE_DAYS)
}

/// Score evidence against the documented heuristics.
///
/// `skill` is the attestation's skill claim (absent for warnings);
/// `issued` is the recency fallback when no interaction date is given.
#[must_use]
pub fn score_evidence(
    evidence: &Evidence,
    skill: Option<&Skill>,
    issued: DateTime<Utc>,
    now: DateTime<Utc>,
) -> EvidenceScore {
    let specificity = score_specificity(evidence);
    let verifiability = score_verifiability(evidence);
    let relevance = score_relevance(evidence, skill);
    let recency = score_recency(evidence, issued, now);

    let composite = WEIGHT_SPECIFICITY * specificity
        + WEIGHT_VERIFIABILITY * verifiability
        + WEIGHT_RELEVANCE * relevance
        + WEIGHT_RECENCY * recency;

    EvidenceScore {
        specificity: round4(specificity),
        verifiability: round4(verifiability),
        relevance: round4(relevance),
        recency: round4(recency),
        composite: round4(composite),
    }
}
