//! Taxonomy browsing and signed custom-entry management.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use kredo_protocol::{is_valid_pubkey, is_valid_signature, verify_signed_value};
use kredo_store::AuditContext;

use crate::error::{ApiError, ApiResult};
use crate::rate_limit::LimitClass;
use crate::routes::{enforce_limit, is_valid_slug, reject, JsonBody, RequestMeta};
use crate::AppState;

/// `GET /taxonomy` — the complete merged taxonomy.
pub(crate) async fn full_taxonomy(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let snapshot = state.store.taxonomy_snapshot()?;
    let domains: serde_json::Map<String, Value> = snapshot
        .domains
        .iter()
        .map(|(slug, entry)| {
            (
                slug.clone(),
                json!({ "label": entry.label, "skills": entry.skills }),
            )
        })
        .collect();
    Ok(Json(json!({
        "version": snapshot.version,
        "domains": domains,
    })))
}

/// `GET /taxonomy/{domain}` — skills for one domain.
pub(crate) async fn domain_skills(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> ApiResult<Json<Value>> {
    let snapshot = state.store.taxonomy_snapshot()?;
    let entry = snapshot
        .domains
        .get(&domain)
        .ok_or_else(|| ApiError::NotFound(format!("unknown domain: '{domain}'")))?;
    Ok(Json(json!({
        "domain": domain,
        "label": entry.label,
        "skills": entry.skills,
    })))
}

fn check_mutation_auth(
    state: &AppState,
    pubkey: &str,
    signature: &str,
) -> ApiResult<()> {
    if !is_valid_pubkey(pubkey) {
        return Err(ApiError::Validation("invalid pubkey format".into()));
    }
    if !is_valid_signature(signature) {
        return Err(ApiError::SignatureInvalid(
            "signature must be 'ed25519:' followed by 128 lowercase hex characters".into(),
        ));
    }
    if state.store.get_known_key(pubkey)?.is_none() {
        return Err(ApiError::Permission(
            "key not registered; register first with POST /register".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateDomainRequest {
    id: String,
    label: String,
    pubkey: String,
    signature: String,
}

/// `POST /taxonomy/domains` — signed custom domain creation.
pub(crate) async fn create_domain(
    State(state): State<AppState>,
    meta: RequestMeta,
    JsonBody(body): JsonBody<CreateDomainRequest>,
) -> ApiResult<Json<Value>> {
    let ctx = AuditContext::new("taxonomy.domain.create")
        .actor(body.pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "domain": body.id }));

    if !is_valid_slug(&body.id) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Validation(
                "domain id must be a hyphenated lowercase slug (e.g. 'vise-operations')".into(),
            ),
        ));
    }
    check_mutation_auth(&state, &body.pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e))?;

    enforce_limit(&state, LimitClass::Taxonomy, &body.pubkey, &ctx)?;

    let payload = json!({
        "action": "create_domain",
        "id": body.id,
        "label": body.label,
        "pubkey": body.pubkey,
    });
    verify_signed_value(&payload, &body.pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    state
        .store
        .create_custom_domain(&body.id, &body.label, &body.pubkey, &ctx)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({
        "status": "created",
        "domain": body.id,
        "label": body.label,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSkillRequest {
    id: String,
    pubkey: String,
    signature: String,
}

/// `POST /taxonomy/domains/{domain}/skills` — signed custom skill.
pub(crate) async fn create_skill(
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(domain): Path<String>,
    JsonBody(body): JsonBody<CreateSkillRequest>,
) -> ApiResult<Json<Value>> {
    let ctx = AuditContext::new("taxonomy.skill.create")
        .actor(body.pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "domain": domain, "skill": body.id }));

    if !is_valid_slug(&body.id) {
        return Err(reject(
            &state,
            &ctx,
            ApiError::Validation(
                "skill id must be a hyphenated lowercase slug (e.g. 'chain-orchestration')".into(),
            ),
        ));
    }
    check_mutation_auth(&state, &body.pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e))?;

    enforce_limit(&state, LimitClass::Taxonomy, &body.pubkey, &ctx)?;

    let payload = json!({
        "action": "create_skill",
        "domain": domain,
        "id": body.id,
        "pubkey": body.pubkey,
    });
    verify_signed_value(&payload, &body.pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    state
        .store
        .create_custom_skill(&domain, &body.id, &body.pubkey, &ctx)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({
        "status": "created",
        "domain": domain,
        "skill": body.id,
    })))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteRequest {
    pubkey: String,
    signature: String,
}

/// `DELETE /taxonomy/domains/{domain}` — creator-only, cascades.
pub(crate) async fn delete_domain(
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(domain): Path<String>,
    JsonBody(body): JsonBody<DeleteRequest>,
) -> ApiResult<Json<Value>> {
    let ctx = AuditContext::new("taxonomy.domain.delete")
        .actor(body.pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "domain": domain }));

    check_mutation_auth(&state, &body.pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e))?;

    enforce_limit(&state, LimitClass::Taxonomy, &body.pubkey, &ctx)?;

    let payload = json!({
        "action": "delete_domain",
        "domain": domain,
        "pubkey": body.pubkey,
    });
    verify_signed_value(&payload, &body.pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    state
        .store
        .delete_custom_domain(&domain, &body.pubkey, &ctx)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({ "status": "deleted", "domain": domain })))
}

/// `DELETE /taxonomy/domains/{domain}/skills/{skill}` — creator-only.
pub(crate) async fn delete_skill(
    State(state): State<AppState>,
    meta: RequestMeta,
    Path((domain, skill)): Path<(String, String)>,
    JsonBody(body): JsonBody<DeleteRequest>,
) -> ApiResult<Json<Value>> {
    let ctx = AuditContext::new("taxonomy.skill.delete")
        .actor(body.pubkey.clone())
        .source(meta.source_ip.clone(), meta.user_agent.clone())
        .details(json!({ "domain": domain, "skill": skill }));

    check_mutation_auth(&state, &body.pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e))?;

    enforce_limit(&state, LimitClass::Taxonomy, &body.pubkey, &ctx)?;

    let payload = json!({
        "action": "delete_skill",
        "domain": domain,
        "skill": skill,
        "pubkey": body.pubkey,
    });
    verify_signed_value(&payload, &body.pubkey, &body.signature)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    state
        .store
        .delete_custom_skill(&domain, &skill, &body.pubkey, &ctx)
        .map_err(|e| reject(&state, &ctx, e.into()))?;

    Ok(Json(json!({
        "status": "deleted",
        "domain": domain,
        "skill": skill,
    })))
}
