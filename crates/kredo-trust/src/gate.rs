//! Accountability tiers and the integrity run-gate.
//!
//! Both produce multipliers that scale reputation into the deployability
//! score used by runtime gates: `reputation x accountability x integrity`.

use serde::{Deserialize, Serialize};

/// Multiplier for agents with a currently active human owner.
pub const HUMAN_LINKED_MULTIPLIER: f64 = 1.0;

/// Multiplier for agents without an active ownership link.
pub const UNLINKED_MULTIPLIER: f64 = 0.6;

/// Changed-or-removed count at which a check goes red.
pub const RED_THRESHOLD: usize = 1;

/// Integrity multiplier when the latest check is green.
pub const GREEN_MULTIPLIER: f64 = 1.0;

/// Integrity multiplier for yellow states.
pub const YELLOW_MULTIPLIER: f64 = 0.5;

/// Integrity multiplier for red states.
pub const RED_MULTIPLIER: f64 = 0.0;

/// Accountability tier for a subject.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Accountability {
    /// `human-linked` or `unlinked`.
    pub tier: String,
    /// Deployability multiplier for this tier.
    pub multiplier: f64,
    /// The active owner's pubkey, when linked.
    pub owner_pubkey: Option<String>,
    /// The active ownership claim id, when linked.
    pub ownership_claim_id: Option<String>,
}

/// Resolve the accountability tier from the active ownership claim.
#[must_use]
pub fn accountability(active_claim: Option<(&str, &str)>) -> Accountability {
    match active_claim {
        Some((claim_id, human_pubkey)) => Accountability {
            tier: "human-linked".into(),
            multiplier: HUMAN_LINKED_MULTIPLIER,
            owner_pubkey: Some(human_pubkey.to_string()),
            ownership_claim_id: Some(claim_id.to_string()),
        },
        None => Accountability {
            tier: "unlinked".into(),
            multiplier: UNLINKED_MULTIPLIER,
            owner_pubkey: None,
            ownership_claim_id: None,
        },
    }
}

/// Integrity traffic light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLight {
    /// Measurement matches the baseline.
    Green,
    /// Additions only, or the state needs owner review.
    Yellow,
    /// Baseline files changed or removed, or no baseline exists.
    Red,
}

impl TrafficLight {
    /// Wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficLight::Green => "green",
            TrafficLight::Yellow => "yellow",
            TrafficLight::Red => "red",
        }
    }

    /// Parse from the stored form; anything unrecognized is red.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "green" => TrafficLight::Green,
            "yellow" => TrafficLight::Yellow,
            _ => TrafficLight::Red,
        }
    }

    /// Deployability multiplier for this light.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        match self {
            TrafficLight::Green => GREEN_MULTIPLIER,
            TrafficLight::Yellow => YELLOW_MULTIPLIER,
            TrafficLight::Red => RED_MULTIPLIER,
        }
    }
}

/// Classify a check diff: red when changed+removed reaches
/// [`RED_THRESHOLD`], yellow for additions only, green for an empty diff.
#[must_use]
pub fn classify_diff(added: usize, removed: usize, changed: usize) -> TrafficLight {
    if changed + removed >= RED_THRESHOLD {
        TrafficLight::Red
    } else if added > 0 {
        TrafficLight::Yellow
    } else {
        TrafficLight::Green
    }
}

/// Latest-check inputs to the gate.
#[derive(Clone, Debug)]
pub struct CheckSummary {
    /// The check's id.
    pub check_id: String,
    /// The baseline it was diffed against.
    pub baseline_id: Option<String>,
    /// Its stored traffic light.
    pub light: TrafficLight,
}

/// The integrity gate decision for a subject.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegrityGate {
    /// Traffic light.
    pub traffic_light: TrafficLight,
    /// Human-oriented state label.
    pub status_label: String,
    /// `safe_to_run`, `owner_review_required`, or `block_run`.
    pub recommended_action: String,
    /// True whenever the state is not green.
    pub requires_owner_reapproval: bool,
    /// Deployability multiplier.
    pub multiplier: f64,
    /// The active baseline, if any.
    pub active_baseline_id: Option<String>,
    /// The latest check, if any.
    pub latest_check_id: Option<String>,
}

fn gate(
    light: TrafficLight,
    label: &str,
    active_baseline_id: Option<String>,
    latest_check_id: Option<String>,
) -> IntegrityGate {
    let recommended_action = match light {
        TrafficLight::Green => "safe_to_run",
        TrafficLight::Yellow => "owner_review_required",
        TrafficLight::Red => "block_run",
    };
    IntegrityGate {
        traffic_light: light,
        status_label: label.to_string(),
        recommended_action: recommended_action.to_string(),
        requires_owner_reapproval: light != TrafficLight::Green,
        multiplier: light.multiplier(),
        active_baseline_id,
        latest_check_id,
    }
}

/// Resolve the integrity gate from the active baseline and latest check.
#[must_use]
pub fn integrity_gate(
    active_baseline_id: Option<&str>,
    latest_check: Option<&CheckSummary>,
) -> IntegrityGate {
    let baseline = active_baseline_id.map(String::from);
    let check_id = latest_check.map(|c| c.check_id.clone());

    let Some(baseline_id) = baseline else {
        return gate(TrafficLight::Red, "unknown_unsigned", None, check_id);
    };
    let Some(check) = latest_check else {
        return gate(
            TrafficLight::Yellow,
            "baseline_set_not_checked",
            Some(baseline_id),
            None,
        );
    };
    if check.baseline_id.as_deref() != Some(baseline_id.as_str()) {
        return gate(
            TrafficLight::Yellow,
            "baseline_changed_recheck_required",
            Some(baseline_id),
            check_id,
        );
    }
    match check.light {
        TrafficLight::Green => gate(TrafficLight::Green, "verified", Some(baseline_id), check_id),
        TrafficLight::Yellow => gate(
            TrafficLight::Yellow,
            "changed_since_baseline",
            Some(baseline_id),
            check_id,
        ),
        TrafficLight::Red => gate(
            TrafficLight::Red,
            "integrity_violation",
            Some(baseline_id),
            check_id,
        ),
    }
}

/// Deployability score: reputation scaled by both gate multipliers.
#[must_use]
pub fn deployability(reputation: f64, accountability_mult: f64, integrity_mult: f64) -> f64 {
    let score = reputation * accountability_mult * integrity_mult;
    (score * 10_000.0).round() / 10_000.0
}
