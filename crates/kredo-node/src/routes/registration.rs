//! Registration endpoints.
//!
//! `POST /register` announces a pubkey without a signature; it can create
//! a row but never change one. `POST /register/update` is the only way to
//! change `name`/`type`, and must be signed by the key itself.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use kredo_protocol::{is_valid_pubkey, is_valid_signature, verify_signed_value};
use kredo_store::{AuditContext, Page, RegisterOutcome};

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::LimitClass;
use crate::routes::{enforce_limit, reject, JsonBody, RequestMeta};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterRequest {
    pubkey: String,
    #[serde(default)]
    name: String,
    #[serde(default = "default_actor_type")]
    r#type: String,
}

fn default_actor_type() -> String {
    "agent".into()
}

fn validate_actor_type(actor_type: &str) -> ApiResult<()> {
    if actor_type == "agent" || actor_type == "human" {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "type must be 'agent' or 'human'".into(),
        ))
    }
}

fn validate_name(name: &str) -> ApiResult<()> {
    if name.chars().count() <= 120 {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "name must be 120 characters or fewer".into(),
        ))
    }
}

/// `POST /register` — unsigned existence announcement.
pub(crate) async fn register(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> ApiResult<Response> {
    let ctx = AuditContext::new("registration.create")
        .actor(body.pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "name": body.name, "type": body.r#type }));

    if !is_valid_pubkey(&body.pubkey) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Validation(
                "pubkey must be 'ed25519:' followed by 64 lowercase hex characters".into(),
            ),
        ));
    }
    if let Err(e) = validate_actor_type(&body.r#type).and_then(|()| validate_name(&body.name)) {
        return Err(reject(&state, &ctx, e));
    }

    enforce_limit(&state, LimitClass::Register, &meta.ip_key(), &ctx)?;

    match state
        .store
        .register_unsigned(&body.pubkey, &body.name, &body.r#type, &ctx)?
    {
        RegisterOutcome::Created(view) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "status": "registered",
                "registration": view,
            })),
        )
            .into_response()),
        // Existing rows are never overwritten; the stored registration
        // comes back so the caller can see what stands.
        RegisterOutcome::Existing(view) => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "conflict",
                "message": "pubkey already registered; existing registration unchanged",
                "details": { "registration": view },
            })),
        )
            .into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterUpdateRequest {
    pubkey: String,
    name: String,
    r#type: String,
    signature: String,
}

/// `POST /register/update` — signed metadata change.
pub(crate) async fn register_update(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<RegisterUpdateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = AuditContext::new("registration.update")
        .actor(body.pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "name": body.name, "type": body.r#type }));

    if !is_valid_pubkey(&body.pubkey) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Validation(
                "pubkey must be 'ed25519:' followed by 64 lowercase hex characters".into(),
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
    if let Err(e) = validate_actor_type(&body.r#type).and_then(|()| validate_name(&body.name)) {
        return Err(reject(&state, &ctx, e));
    }

    let payload = json!({
        "action": "register_update",
        "pubkey": body.pubkey,
        "name": body.name,
        "type": body.r#type,
    });
    if let Err(e) = verify_signed_value(&payload, &body.pubkey, &body.signature) {
        return Err(reject(&state, &ctx, e.into()));
    }

    let view = state
        .store
        .register_update(&body.pubkey, &body.name, &body.r#type, &ctx)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({
        "status": "updated",
        "registration": view,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

/// `GET /agents` — the public directory, newest first.
pub(crate) async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let page = Page::clamped(query.limit, query.offset);
    let agents = state.store.list_known_keys(page)?;
    let total = state.store.count_known_keys()?;
    Ok(Json(json!({
        "agents": agents,
        "total": total,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// `GET /agents/{pubkey}` — one directory entry.
pub(crate) async fn get_agent(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let agent = state
        .store
        .get_known_key(&pubkey)?
        .ok_or_else(|| ApiError::NotFound(format!("agent not found: {pubkey}")))?;
    Ok(Json(serde_json::to_value(agent).map_err(|e| ApiError::Internal(e.to_string()))?))
}
