//! Integrity run-gate endpoints.
//!
//! Baselines are owner-signed and require an active ownership claim;
//! checks are agent-signed measurements diffed against the active
//! baseline. The traffic light follows the diff: empty is green,
//! additions only is yellow, any changed or removed baseline path is red.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use kredo_protocol::{is_valid_pubkey, is_valid_signature, verify_signed_value};
use kredo_store::{diff_manifests, AuditContext, FileHash, IntegrityDiff};
use kredo_trust::{classify_diff, integrity_gate, CheckSummary, IntegrityGate, TrafficLight};

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::LimitClass;
use crate::routes::{enforce_limit, is_valid_client_id, reject, JsonBody, RequestMeta};
use crate::AppState;

/// Manifest size cap.
const MAX_MANIFEST_FILES: usize = 5000;

/// Path length cap per manifest entry.
const MAX_PATH_CHARS: usize = 512;

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Validate, dedupe, and sort a submitted manifest. The sorted form is
/// also what gets signed, so normalization must be deterministic.
fn normalize_manifest(raw: &[FileHash]) -> ApiResult<Vec<FileHash>> {
    if raw.is_empty() {
        return Err(ApiError::Validation(
            "file_hashes must include at least one file".into(),
        ));
    }
    if raw.len() > MAX_MANIFEST_FILES {
        return Err(ApiError::Validation(format!(
            "file_hashes cannot exceed {MAX_MANIFEST_FILES} files"
        )));
    }
    let mut seen = std::collections::HashSet::new();
    let mut normalized = Vec::with_capacity(raw.len());
    for entry in raw {
        let path = entry.path.trim();
        if path.is_empty() {
            return Err(ApiError::Validation("path must not be empty".into()));
        }
        if path.chars().count() > MAX_PATH_CHARS {
            return Err(ApiError::Validation(format!(
                "path must be {MAX_PATH_CHARS} characters or fewer"
            )));
        }
        let sha256 = entry.sha256.trim().to_lowercase();
        if !is_sha256_hex(&sha256) {
            return Err(ApiError::Validation(
                "sha256 must be 64 lowercase hex characters".into(),
            ));
        }
        if !seen.insert(path.to_string()) {
            return Err(ApiError::Validation(format!(
                "duplicate path in file_hashes: {path}"
            )));
        }
        normalized.push(FileHash {
            path: path.to_string(),
            sha256,
        });
    }
    normalized.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(normalized)
}

fn manifest_payload(hashes: &[FileHash]) -> Value {
    json!(hashes)
}

fn gate_fields(gate: &IntegrityGate) -> Value {
    json!({
        "traffic_light": gate.traffic_light,
        "status_label": gate.status_label,
        "recommended_action": gate.recommended_action,
        "requires_owner_reapproval": gate.requires_owner_reapproval,
        "multiplier": gate.multiplier,
    })
}

fn merge(base: Value, extra: Value) -> Value {
    let mut merged = base;
    if let (Some(obj), Some(extra_obj)) = (merged.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            obj.insert(k.clone(), v.clone());
        }
    }
    merged
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetBaselineRequest {
    baseline_id: Option<String>,
    agent_pubkey: String,
    owner_pubkey: String,
    file_hashes: Vec<FileHash>,
    signature: String,
}

/// `POST /integrity/baseline/set` — owner-signed baseline approval.
pub(crate) async fn set_baseline(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<SetBaselineRequest>,
) -> ApiResult<Json<Value>> {
    let baseline_id = body
        .baseline_id
        .clone()
        .unwrap_or_else(|| format!("bl-{}", Uuid::new_v4().simple()));

    let ctx = AuditContext::new("integrity.baseline.set")
        .actor(body.owner_pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({
            "baseline_id": baseline_id,
            "agent_pubkey": body.agent_pubkey,
            "file_count": body.file_hashes.len(),
        }));

    if !is_valid_client_id(&baseline_id) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Validation("baseline_id must match [A-Za-z0-9_-]{8,100}".into()),
        ));
    }
    if !is_valid_pubkey(&body.agent_pubkey) || !is_valid_pubkey(&body.owner_pubkey) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Validation(
                "pubkeys must be 'ed25519:' followed by 64 lowercase hex characters".into(),
            ),
        ));
    }
    if !is_valid_signature(&body.signature) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::SignatureInvalid(
                "signature must be 'ed25519:' followed by 128 lowercase hex characters".into(),
            ),
        ));
    }

    enforce_limit(&state, LimitClass::Ownership, &body.owner_pubkey, &ctx)?;

    let normalized = normalize_manifest(&body.file_hashes).map_err(|e| reject(&state, &ctx, e))?;

    // Only the currently active owner may set a baseline.
    let active_owner = state.store.active_owner(&body.agent_pubkey)?;
    if active_owner.map_or(true, |claim| claim.human_pubkey != body.owner_pubkey) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Permission(
                "agent must be human-linked, and the baseline must be approved by the \
                 active owner"
                    .into(),
            ),
        ));
    }

    let payload = json!({
        "action": "integrity_set_baseline",
        "baseline_id": baseline_id,
        "agent_pubkey": body.agent_pubkey,
        "owner_pubkey": body.owner_pubkey,
        "file_hashes": manifest_payload(&normalized),
    });
    verify_signed_value(&payload, &body.owner_pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    let baseline = state
        .store
        .set_integrity_baseline(
            &baseline_id,
            &body.agent_pubkey,
            &body.owner_pubkey,
            &normalized,
            &body.signature,
            &ctx,
        )
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    let gate = integrity_gate(Some(&baseline.baseline_id), None);
    Ok(Json(merge(
        json!({
            "status": "baseline_set",
            "baseline_id": baseline.baseline_id,
            "agent_pubkey": baseline.agent_pubkey,
            "owner_pubkey": baseline.owner_pubkey,
            "file_count": baseline.file_hashes.len(),
        }),
        gate_fields(&gate),
    )))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckRequest {
    agent_pubkey: String,
    file_hashes: Vec<FileHash>,
    signature: String,
}

/// `POST /integrity/check` — agent-signed runtime measurement.
pub(crate) async fn check(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<CheckRequest>,
) -> ApiResult<Json<Value>> {
    let ctx = AuditContext::new("integrity.check")
        .actor(body.agent_pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "file_count": body.file_hashes.len() }));

    if !is_valid_pubkey(&body.agent_pubkey) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Validation(
                "agent_pubkey must be 'ed25519:' followed by 64 lowercase hex characters".into(),
            ),
        ));
    }
    if !is_valid_signature(&body.signature) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::SignatureInvalid(
                "signature must be 'ed25519:' followed by 128 lowercase hex characters".into(),
            ),
        ));
    }

    enforce_limit(&state, LimitClass::Ownership, &body.agent_pubkey, &ctx)?;

    let normalized = normalize_manifest(&body.file_hashes).map_err(|e| reject(&state, &ctx, e))?;

    let payload = json!({
        "action": "integrity_check",
        "agent_pubkey": body.agent_pubkey,
        "file_hashes": manifest_payload(&normalized),
    });
    verify_signed_value(&payload, &body.agent_pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    let baseline = state.store.active_integrity_baseline(&body.agent_pubkey)?;
    let (light, diff, baseline_id) = match &baseline {
        None => (TrafficLight::Red, IntegrityDiff::default(), None),
        Some(baseline) => {
            let diff = diff_manifests(&baseline.file_hashes, &normalized);
            let light = classify_diff(diff.added.len(), diff.removed.len(), diff.changed.len());
            (light, diff, Some(baseline.baseline_id.clone()))
        }
    };

    let check_id = format!("chk-{}", Uuid::new_v4().simple());
    let recorded = state
        .store
        .record_integrity_check(
            &check_id,
            &body.agent_pubkey,
            baseline_id.as_deref(),
            light.as_str(),
            &diff,
            &normalized,
            &body.signature,
            &ctx,
        )
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    let gate = integrity_gate(
        baseline_id.as_deref(),
        Some(&CheckSummary {
            check_id: recorded.check_id.clone(),
            baseline_id: baseline_id.clone(),
            light,
        }),
    );

    Ok(Json(merge(
        json!({
            "status": light,
            "agent_pubkey": body.agent_pubkey,
            "baseline_id": baseline_id,
            "check_id": recorded.check_id,
            "diff": diff,
        }),
        gate_fields(&gate),
    )))
}

/// `GET /integrity/status/{pubkey}` — current run-gate for an agent.
pub(crate) async fn status(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> ApiResult<Json<Value>> {
    if !is_valid_pubkey(&pubkey) {
        return Err(ApiError::Validation(
            "agent_pubkey must be 'ed25519:' followed by 64 lowercase hex characters".into(),
        ));
    }

    let baseline = state.store.active_integrity_baseline(&pubkey)?;
    let latest = state.store.latest_integrity_check(&pubkey)?;

    let gate = integrity_gate(
        baseline.as_ref().map(|b| b.baseline_id.as_str()),
        latest
            .as_ref()
            .map(|check| CheckSummary {
                check_id: check.check_id.clone(),
                baseline_id: check.baseline_id.clone(),
                light: TrafficLight::from_str_lossy(&check.status),
            })
            .as_ref(),
    );

    Ok(Json(merge(
        json!({
            "agent_pubkey": pubkey,
            "active_baseline": baseline,
            "latest_check": latest,
        }),
        gate_fields(&gate),
    )))
}
