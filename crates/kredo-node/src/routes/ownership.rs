//! Ownership endpoints: claim, confirm, revoke, and history.
//!
//! Each transition is authenticated purely by signature: the claim by the
//! agent key, the confirmation by the human key named in the claim, the
//! revocation by either party.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use kredo_protocol::{is_valid_pubkey, is_valid_signature, verify_signed_value};
use kredo_store::AuditContext;

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::LimitClass;
use crate::routes::{enforce_limit, is_valid_client_id, reject, JsonBody, RequestMeta};
use crate::AppState;

fn check_pubkey(value: &str, field: &str) -> ApiResult<()> {
    if is_valid_pubkey(value) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "{field} must be 'ed25519:' followed by 64 lowercase hex characters"
        )))
    }
}

fn check_signature(value: &str) -> ApiResult<()> {
    if is_valid_signature(value) {
        Ok(())
    } else {
        Err(ApiError::SignatureInvalid(
            "signature must be 'ed25519:' followed by 128 lowercase hex characters".into(),
        ))
    }
}

/// Look up a registered key and require the given actor type.
fn require_registered(
    state: &AppState,
    pubkey: &str,
    expected_type: &str,
) -> ApiResult<()> {
    match state.store.get_known_key(pubkey)? {
        Some(view) if view.actor_type == expected_type => Ok(()),
        Some(_) | None => Err(ApiError::NotFound(format!(
            "{expected_type} key not found or not type={expected_type}: {pubkey}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClaimRequest {
    claim_id: Option<String>,
    agent_pubkey: String,
    human_pubkey: String,
    signature: String,
}

/// `POST /ownership/claim` — agent-signed, creates a pending claim.
pub(crate) async fn claim(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<ClaimRequest>,
) -> ApiResult<Json<Value>> {
    let claim_id = body
        .claim_id
        .clone()
        .unwrap_or_else(|| format!("own-{}", Uuid::new_v4().simple()));

    let ctx = AuditContext::new("ownership.claim")
        .actor(body.agent_pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "claim_id": claim_id, "human_pubkey": body.human_pubkey }));

    if !is_valid_client_id(&claim_id) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Validation("claim_id must match [A-Za-z0-9_-]{8,100}".into()),
        ));
    }
    check_pubkey(&body.agent_pubkey, "agent_pubkey").map_err(|e| reject(&state, &ctx, e))?;
    check_pubkey(&body.human_pubkey, "human_pubkey").map_err(|e| reject(&state, &ctx, e))?;
    check_signature(&body.signature).map_err(|e| reject(&state, &ctx, e))?;

    enforce_limit(&state, LimitClass::Ownership, &body.agent_pubkey, &ctx)?;

    require_registered(&state, &body.agent_pubkey, "agent").map_err(|e| reject(&state, &ctx, e))?;
    require_registered(&state, &body.human_pubkey, "human").map_err(|e| reject(&state, &ctx, e))?;

    let payload = json!({
        "action": "ownership_claim",
        "claim_id": claim_id,
        "agent_pubkey": body.agent_pubkey,
        "human_pubkey": body.human_pubkey,
    });
    verify_signed_value(&payload, &body.agent_pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    let claim = state
        .store
        .create_ownership_claim(
            &claim_id,
            &body.agent_pubkey,
            &body.human_pubkey,
            &body.signature,
            &payload.to_string(),
            &ctx,
        )
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({
        "status": "pending",
        "claim_id": claim.claim_id,
        "agent_pubkey": claim.agent_pubkey,
        "human_pubkey": claim.human_pubkey,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfirmRequest {
    claim_id: String,
    human_pubkey: String,
    signature: String,
}

/// `POST /ownership/confirm` — signed by the human named in the claim.
pub(crate) async fn confirm(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<ConfirmRequest>,
) -> ApiResult<Json<Value>> {
    let ctx = AuditContext::new("ownership.confirm")
        .actor(body.human_pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "claim_id": body.claim_id }));

    check_pubkey(&body.human_pubkey, "human_pubkey").map_err(|e| reject(&state, &ctx, e))?;
    check_signature(&body.signature).map_err(|e| reject(&state, &ctx, e))?;

    enforce_limit(&state, LimitClass::Ownership, &body.human_pubkey, &ctx)?;

    let claim = state
        .store
        .get_ownership_claim(&body.claim_id)?
        .ok_or_else(|| {
            reject(
                &state,
                &ctx,
                ApiError::NotFound(format!("ownership claim not found: {}", body.claim_id)),
            )
        })?;

    let payload = json!({
        "action": "ownership_confirm",
        "claim_id": body.claim_id,
        "agent_pubkey": claim.agent_pubkey,
        "human_pubkey": body.human_pubkey,
    });
    verify_signed_value(&payload, &body.human_pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    let claim = state
        .store
        .confirm_ownership_claim(
            &body.claim_id,
            &body.human_pubkey,
            &body.signature,
            &payload.to_string(),
            &ctx,
        )
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({
        "status": "active",
        "claim_id": claim.claim_id,
        "agent_pubkey": claim.agent_pubkey,
        "human_pubkey": claim.human_pubkey,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RevokeRequest {
    claim_id: String,
    revoker_pubkey: String,
    reason: String,
    signature: String,
}

/// `POST /ownership/revoke` — signed by the agent or the human owner.
pub(crate) async fn revoke(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<RevokeRequest>,
) -> ApiResult<Json<Value>> {
    let ctx = AuditContext::new("ownership.revoke")
        .actor(body.revoker_pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "claim_id": body.claim_id }));

    check_pubkey(&body.revoker_pubkey, "revoker_pubkey").map_err(|e| reject(&state, &ctx, e))?;
    check_signature(&body.signature).map_err(|e| reject(&state, &ctx, e))?;
    let reason = body.reason.trim();
    if reason.len() < 8 || reason.len() > 500 {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Validation("reason must be between 8 and 500 characters".into()),
        ));
    }

    enforce_limit(&state, LimitClass::Ownership, &body.revoker_pubkey, &ctx)?;

    let claim = state
        .store
        .get_ownership_claim(&body.claim_id)?
        .ok_or_else(|| {
            reject(
                &state,
                &ctx,
                ApiError::NotFound(format!("ownership claim not found: {}", body.claim_id)),
            )
        })?;

    let payload = json!({
        "action": "ownership_revoke",
        "claim_id": body.claim_id,
        "agent_pubkey": claim.agent_pubkey,
        "human_pubkey": claim.human_pubkey,
        "revoker_pubkey": body.revoker_pubkey,
        "reason": reason,
    });
    verify_signed_value(&payload, &body.revoker_pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    state
        .store
        .revoke_ownership_claim(&body.claim_id, &body.revoker_pubkey, reason, &ctx)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({
        "status": "revoked",
        "claim_id": body.claim_id,
    })))
}

/// `GET /ownership/agent/{pubkey}` — active owner plus claim history.
pub(crate) async fn agent_ownership(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> ApiResult<Json<Value>> {
    check_pubkey(&pubkey, "agent_pubkey")?;
    let active = state.store.active_owner(&pubkey)?;
    let claims = state.store.ownership_history(&pubkey)?;
    Ok(Json(json!({
        "agent_pubkey": pubkey,
        "active_owner": active,
        "claims": claims,
    })))
}
