//! Revocation and dispute submission.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use kredo_protocol::{Dispute, Revocation};
use kredo_store::AuditContext;

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::LimitClass;
use crate::routes::{enforce_limit, reject, JsonBody, RequestMeta};
use crate::AppState;

/// `POST /revoke` — only the original attestor can revoke.
pub(crate) async fn submit_revocation(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Value>> {
    let rev: Revocation = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("invalid revocation: {e}")))?;

    let ctx = AuditContext::new("revocation.submit")
        .actor(rev.revoker.pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "id": rev.id, "attestation_id": rev.attestation_id }));

    enforce_limit(&state, LimitClass::Submission, &rev.revoker.pubkey, &ctx)?;

    rev.validate().map_err(|e| reject(&state, &ctx, e.into()))?;
    rev.verify().map_err(|e| reject(&state, &ctx, e.into()))?;

    state
        .store
        .revoke_attestation(&rev, &ctx)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({
        "status": "revoked",
        "revocation_id": rev.id,
        "attestation_id": rev.attestation_id,
    })))
}

/// `POST /dispute` — only the warning's subject can dispute.
pub(crate) async fn submit_dispute(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<Value>,
) -> ApiResult<Json<Value>> {
    let disp: Dispute = serde_json::from_value(body)
        .map_err(|e| ApiError::Validation(format!("invalid dispute: {e}")))?;

    let ctx = AuditContext::new("dispute.submit")
        .actor(disp.disputor.pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "id": disp.id, "warning_id": disp.warning_id }));

    enforce_limit(&state, LimitClass::Submission, &disp.disputor.pubkey, &ctx)?;

    disp.validate().map_err(|e| reject(&state, &ctx, e.into()))?;
    disp.verify().map_err(|e| reject(&state, &ctx, e.into()))?;

    state
        .store
        .insert_dispute(&disp, &ctx)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({
        "status": "disputed",
        "dispute_id": disp.id,
        "warning_id": disp.warning_id,
    })))
}
