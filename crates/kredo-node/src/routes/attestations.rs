//! Attestation submission, retrieval, and document verification.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use kredo_protocol::{Attestation, AttestationType, Dispute, DocumentKind, Revocation};
use kredo_store::{AuditContext, EvidenceScores};
use kredo_trust::{score_evidence, EvidenceScore, WARNING_MIN_COMPOSITE};

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::LimitClass;
use crate::routes::{enforce_limit, reject, JsonBody, RequestMeta};
use crate::AppState;

fn to_stored_scores(score: &EvidenceScore) -> EvidenceScores {
    EvidenceScores {
        specificity: score.specificity,
        verifiability: score.verifiability,
        relevance: score.relevance,
        recency: score.recency,
        composite: score.composite,
    }
}

fn score_payload(score: &EvidenceScore) -> Value {
    json!({
        "composite": score.composite,
        "specificity": score.specificity,
        "verifiability": score.verifiability,
        "relevance": score.relevance,
        "recency": score.recency,
    })
}

/// Shape, taxonomy, signature, and expiry checks shared by `/attestations`
/// and `/verify`.
fn check_attestation(state: &AppState, att: &Attestation) -> ApiResult<EvidenceScore> {
    att.validate()?;

    if let Some(skill) = &att.skill {
        let taxonomy = state.store.taxonomy_snapshot()?;
        if !taxonomy.has_domain(&skill.domain) {
            return Err(ApiError::Validation(format!(
                "unknown domain: '{}'",
                skill.domain
            )));
        }
        if !taxonomy.is_valid_skill(&skill.domain, &skill.specific) {
            return Err(ApiError::Validation(format!(
                "unknown skill '{}' in domain '{}'",
                skill.specific, skill.domain
            )));
        }
    }

    att.verify()?;

    let now = kredo_protocol::time::now();
    if att.is_expired(now) {
        return Err(ApiError::Validation(
            "attestation has already expired".into(),
        ));
    }

    let score = score_evidence(&att.evidence, att.skill.as_ref(), att.issued, now);
    if att.attestation_type == AttestationType::BehavioralWarning
        && score.composite < WARNING_MIN_COMPOSITE
    {
        return Err(ApiError::EvidenceInsufficient(format!(
            "behavioral_warning requires evidence composite >= {WARNING_MIN_COMPOSITE} \
             (scored {:.4})",
            score.composite
        )));
    }
    Ok(score)
}

/// `POST /attestations` — submit a signed attestation.
pub(crate) async fn submit_attestation(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Response> {
    let att: Attestation = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("invalid attestation: {e}")))?;

    let ctx = AuditContext::new("attestation.submit")
        .actor(att.attestor.pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({
            "id": att.id,
            "type": att.attestation_type.as_str(),
            "subject": att.subject.pubkey,
        }));

    enforce_limit(&state, LimitClass::Submission, &att.attestor.pubkey, &ctx)?;

    let score = check_attestation(&state, &att).map_err(|e| reject(&state, &ctx, e))?;

    let stored = state
        .store
        .insert_attestation(&att, to_stored_scores(&score), &ctx)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "accepted",
            "id": stored.document.id,
            "evidence_score": score_payload(&score),
        })),
    )
        .into_response())
}

/// `GET /attestations/{id}` — one attestation with stored metadata.
pub(crate) async fn get_attestation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let stored = state
        .store
        .get_attestation(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("attestation not found: {id}")))?;

    let mut body = serde_json::to_value(&stored.document)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    body["_meta"] = json!({
        "is_revoked": stored.is_revoked,
        "revoked_at": stored.revoked_at,
        "stored_at": stored.stored_at,
        "evidence_score": stored.evidence_score,
    });
    Ok(Json(body))
}

/// `POST /verify` — verify any signed document without storing it.
/// The document type is detected from its shape.
pub(crate) async fn verify_document(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Value>> {
    let kind = DocumentKind::detect(&body).ok_or_else(|| {
        ApiError::Validation(
            "cannot determine document type; expected attestation, dispute, or revocation fields"
                .into(),
        )
    })?;

    match kind {
        DocumentKind::Attestation => {
            let att: Attestation = serde_json::from_value(body)
                .map_err(|e| ApiError::Validation(format!("invalid attestation: {e}")))?;
            att.validate()?;
            let now = kredo_protocol::time::now();
            let score = score_evidence(&att.evidence, att.skill.as_ref(), att.issued, now);
            match att.verify() {
                Ok(()) => Ok(Json(json!({
                    "valid": true,
                    "type": "attestation",
                    "attestation_type": att.attestation_type.as_str(),
                    "subject": att.subject.pubkey,
                    "attestor": att.attestor.pubkey,
                    "expired": att.is_expired(now),
                    "evidence_score": score.composite,
                }))),
                Err(e) => Ok(Json(verification_failure("attestation", &e))),
            }
        }
        DocumentKind::Revocation => {
            let rev: Revocation = serde_json::from_value(body)
                .map_err(|e| ApiError::Validation(format!("invalid revocation: {e}")))?;
            rev.validate()?;
            match rev.verify() {
                Ok(()) => Ok(Json(json!({
                    "valid": true,
                    "type": "revocation",
                    "attestation_id": rev.attestation_id,
                    "revoker": rev.revoker.pubkey,
                    "target_known": state.store.attestation_exists(&rev.attestation_id)?,
                }))),
                Err(e) => Ok(Json(verification_failure("revocation", &e))),
            }
        }
        DocumentKind::Dispute => {
            let disp: Dispute = serde_json::from_value(body)
                .map_err(|e| ApiError::Validation(format!("invalid dispute: {e}")))?;
            disp.validate()?;
            match disp.verify() {
                Ok(()) => Ok(Json(json!({
                    "valid": true,
                    "type": "dispute",
                    "warning_id": disp.warning_id,
                    "disputor": disp.disputor.pubkey,
                }))),
                Err(e) => Ok(Json(verification_failure("dispute", &e))),
            }
        }
    }
}

fn verification_failure(kind: &str, err: &kredo_protocol::ProtocolError) -> Value {
    json!({
        "valid": false,
        "type": kind,
        "reason": err.to_string(),
    })
}
