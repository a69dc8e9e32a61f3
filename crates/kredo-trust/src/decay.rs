//! Age decay shared by recency scoring and attestation weighting.

use chrono::{DateTime, Utc};

/// Decay half-life for attestation weight, in days.
pub const DECAY_HALF_LIFE_DAYS: f64 = 180.0;

/// Exponential half-life decay: `2^(-days/half_life)`, clamped to [0, 1].
///
/// A reference time in the future scores 1.0.
#[must_use]
pub fn half_life_decay(reference: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let elapsed_days = (now - reference).num_seconds() as f64 / 86_400.0;
    if elapsed_days <= 0.0 {
        return 1.0;
    }
    (2f64).powf(-elapsed_days / half_life_days).clamp(0.0, 1.0)
}

/// Weight decay from an attestation's issue date.
#[must_use]
pub fn issued_decay(issued: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    half_life_decay(issued, now, DECAY_HALF_LIFE_DAYS)
}
