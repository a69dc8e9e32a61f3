//! Trust analysis endpoints, served through the short-TTL cache.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use kredo_store::StoredAttestation;
use kredo_trust::{
    analysis_key, analyze_subject, detect_rings, network_health, TrustAttestation, TrustSnapshot,
    NETWORK_HEALTH_KEY, RINGS_KEY,
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Map a stored row into the engine's input form.
pub(crate) fn to_trust_input(stored: &StoredAttestation) -> TrustAttestation {
    TrustAttestation {
        id: stored.document.id.clone(),
        attestation_type: stored.document.attestation_type,
        attestor_pubkey: stored.document.attestor.pubkey.clone(),
        subject_pubkey: stored.document.subject.pubkey.clone(),
        skill: stored.document.skill.clone(),
        evidence: stored.document.evidence.clone(),
        issued: stored.document.issued,
        expires: stored.document.expires,
    }
}

/// Take a fresh read snapshot of all live attestations.
pub(crate) fn load_snapshot(state: &AppState) -> ApiResult<TrustSnapshot> {
    let rows = state.store.all_active_attestations()?;
    let inputs = rows.iter().map(to_trust_input).collect();
    Ok(TrustSnapshot::new(inputs, kredo_protocol::time::now()))
}

fn cached_or(
    state: &AppState,
    key: &str,
    compute: impl FnOnce() -> ApiResult<Value>,
) -> ApiResult<Value> {
    if let Some(hit) = state.cache.get(key) {
        return Ok((*hit).clone());
    }
    let value = compute()?;
    state.cache.put(key.to_string(), value.clone());
    Ok(value)
}

/// `GET /trust/analysis/{pubkey}` — full analysis for one subject.
pub(crate) async fn trust_analysis(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> ApiResult<Json<Value>> {
    let payload = cached_or(&state, &analysis_key(&pubkey), || {
        let snapshot = load_snapshot(&state)?;
        let analysis = analyze_subject(&snapshot, &pubkey);
        serde_json::to_value(&analysis).map_err(|e| ApiError::Internal(e.to_string()))
    })?;
    Ok(Json(payload))
}

/// `GET /trust/rings` — network-wide ring report.
pub(crate) async fn rings_report(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let payload = cached_or(&state, RINGS_KEY, || {
        let snapshot = load_snapshot(&state)?;
        let rings = detect_rings(&snapshot);
        Ok(json!({
            "ring_count": rings.len(),
            "rings": rings,
        }))
    })?;
    Ok(Json(payload))
}

/// `GET /trust/network-health` — aggregate graph statistics.
pub(crate) async fn network_health_report(
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let payload = cached_or(&state, NETWORK_HEALTH_KEY, || {
        let snapshot = load_snapshot(&state)?;
        serde_json::to_value(network_health(&snapshot))
            .map_err(|e| ApiError::Internal(e.to_string()))
    })?;
    Ok(Json(payload))
}
