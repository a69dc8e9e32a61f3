//! The subject profile assembler.
//!
//! Joins the store's profile bundle with live trust analysis,
//! accountability, and the integrity gate into the single DTO behind
//! `GET /agents/{pubkey}/profile`. The bundle is fetched in one
//! consistent read; this module never touches SQL.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use kredo_protocol::ActorType;
use kredo_trust::{
    accountability, analyze_subject, attestor_reputation, deployability, detect_rings,
    integrity_gate, profile_key, CheckSummary, TrafficLight, TrustSnapshot,
};

use crate::error::{ApiError, ApiResult};
use crate::routes::trust::to_trust_input;
use crate::AppState;

/// `GET /agents/{pubkey}/profile`.
pub(crate) async fn agent_profile(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> ApiResult<Json<Value>> {
    if let Some(hit) = state.cache.get(&profile_key(&pubkey)) {
        return Ok(Json((*hit).clone()));
    }

    let bundle = state
        .store
        .profile_bundle(&pubkey)?
        .ok_or_else(|| ApiError::NotFound(format!("agent not found: {pubkey}")))?;

    let snapshot = TrustSnapshot::new(
        bundle.all_active.iter().map(to_trust_input).collect(),
        kredo_protocol::time::now(),
    );
    let analysis = analyze_subject(&snapshot, &pubkey);

    // Attestor breakdown by registered actor type.
    let mut by_agents = 0u64;
    let mut by_humans = 0u64;
    for stored in &bundle.attestations {
        match stored.document.attestor.actor_type {
            ActorType::Human => by_humans += 1,
            ActorType::Agent => by_agents += 1,
        }
    }

    // Accept-time composite average; live recomputation happens in the
    // trust analysis where recency matters.
    let evidence_quality_avg = if bundle.attestations.is_empty() {
        None
    } else {
        let sum: f64 = bundle
            .attestations
            .iter()
            .map(|a| a.evidence_score.composite)
            .sum();
        Some((sum / bundle.attestations.len() as f64 * 10_000.0).round() / 10_000.0)
    };

    let warnings: Vec<Value> = bundle
        .warnings
        .iter()
        .map(|row| {
            json!({
                "id": row.attestation.document.id,
                "category": row.attestation.document.warning_category,
                "attestor": row.attestation.document.attestor.pubkey,
                "issued": kredo_protocol::time::format(row.attestation.document.issued),
                "is_revoked": row.attestation.is_revoked,
                "dispute_count": row.dispute_count,
            })
        })
        .collect();

    let trust_network: Vec<Value> = bundle
        .trust_network
        .iter()
        .map(|entry| {
            json!({
                "pubkey": entry.pubkey,
                "type": entry.actor_type,
                "attestation_count_for_subject": entry.attestation_count_for_subject,
                "attestor_own_attestation_count": entry.attestor_own_attestation_count,
            })
        })
        .collect();

    let ring_flags: Vec<Value> = analysis
        .rings_involved
        .iter()
        .map(|ring| {
            json!({
                "ring_type": ring.ring_type,
                "members": ring.members,
                "size": ring.size,
            })
        })
        .collect();

    let account = accountability(
        bundle
            .active_owner
            .as_ref()
            .map(|claim| (claim.claim_id.as_str(), claim.human_pubkey.as_str())),
    );
    let owner = bundle.active_owner.as_ref().map(|claim| {
        let rings = detect_rings(&snapshot);
        let owner_reputation = attestor_reputation(&snapshot, &claim.human_pubkey, &rings);
        let (name, actor_type) = bundle
            .owner_registration
            .as_ref()
            .map_or((String::new(), "human".to_string()), |r| {
                (r.name.clone(), r.actor_type.clone())
            });
        json!({
            "pubkey": claim.human_pubkey,
            "name": name,
            "type": actor_type,
            "reputation_score": (owner_reputation * 10_000.0).round() / 10_000.0,
        })
    });

    let gate = integrity_gate(
        bundle
            .active_baseline
            .as_ref()
            .map(|b| b.baseline_id.as_str()),
        bundle
            .latest_check
            .as_ref()
            .map(|check| CheckSummary {
                check_id: check.check_id.clone(),
                baseline_id: check.baseline_id.clone(),
                light: TrafficLight::from_str_lossy(&check.status),
            })
            .as_ref(),
    );

    let deployability_multiplier =
        (account.multiplier * gate.multiplier * 10_000.0).round() / 10_000.0;
    let deployability_score =
        deployability(analysis.reputation_score, account.multiplier, gate.multiplier);

    let payload = json!({
        "pubkey": pubkey,
        "name": bundle.registration.name,
        "type": bundle.registration.actor_type,
        "registered": bundle.registration.first_seen,
        "last_seen": bundle.registration.last_seen,
        "attestation_count": {
            "total": bundle.attestations.len(),
            "by_agents": by_agents,
            "by_humans": by_humans,
        },
        "evidence_quality_avg": evidence_quality_avg,
        "skills": analysis.weighted_skills,
        "warnings": warnings,
        "trust_network": trust_network,
        "trust_analysis": {
            "reputation_score": analysis.reputation_score,
            "ring_flags": ring_flags,
            "per_attestation": analysis.attestation_weights,
        },
        "accountability": {
            "tier": account.tier,
            "multiplier": account.multiplier,
            "ownership_claim_id": account.ownership_claim_id,
            "owner": owner,
        },
        "integrity": {
            "traffic_light": gate.traffic_light,
            "status_label": gate.status_label,
            "recommended_action": gate.recommended_action,
            "requires_owner_reapproval": gate.requires_owner_reapproval,
            "multiplier": gate.multiplier,
            "active_baseline_id": gate.active_baseline_id,
            "latest_check_id": gate.latest_check_id,
        },
        "deployability_multiplier": deployability_multiplier,
        "deployability_score": deployability_score,
    });

    state.cache.put(profile_key(&pubkey), payload.clone());
    Ok(Json(payload))
}
