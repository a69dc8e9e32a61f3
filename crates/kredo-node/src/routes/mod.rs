//! Route assembly and shared handler plumbing.

pub mod attestations;
pub mod integrity;
pub mod ownership;
pub mod profiles;
pub mod registration;
pub mod revocations;
pub mod risk;
pub mod search;
pub mod taxonomy;
pub mod trust;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use kredo_store::AuditContext;

use crate::error::ApiError;
use crate::rate_limit::{Decision, LimitClass};
use crate::AppState;

/// Request source metadata recorded with every write's audit row.
#[derive(Clone, Debug, Default)]
pub struct RequestMeta {
    /// Client IP: first `X-Forwarded-For` hop, else the socket peer.
    pub source_ip: Option<String>,
    /// `User-Agent` header.
    pub user_agent: Option<String>,
}

impl RequestMeta {
    /// The rate-limit key for IP-keyed endpoints.
    #[must_use]
    pub fn ip_key(&self) -> String {
        self.source_ip.clone().unwrap_or_else(|| "unknown".into())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let source_ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        });
        let user_agent = parts
            .headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        Ok(Self {
            source_ip,
            user_agent,
        })
    }
}

/// JSON body extractor whose rejections use the uniform error envelope
/// (axum's default `Json` rejection would bypass it).
pub(crate) struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(format!("unreadable request body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|e| ApiError::Validation(format!("invalid request body: {e}")))
    }
}

/// Admit a write through the rate limiter, auditing a denial.
pub(crate) fn enforce_limit(
    state: &AppState,
    class: LimitClass,
    key: &str,
    ctx: &AuditContext,
) -> Result<(), ApiError> {
    match state.limiter.check(class, key) {
        Decision::Allowed => Ok(()),
        Decision::Limited {
            retry_after_seconds,
        } => {
            audit_outcome(state, ctx, "rate_limited");
            Err(ApiError::RateLimited {
                retry_after_seconds,
            })
        }
    }
}

/// Record a rejected write request, then hand the error back. Audit
/// failures are logged, never surfaced over a rejection.
pub(crate) fn reject(state: &AppState, ctx: &AuditContext, err: ApiError) -> ApiError {
    let mut ctx = ctx.clone();
    let mut details = ctx
        .details
        .take()
        .unwrap_or_else(|| json!({}));
    details["error"] = json!(err.to_string());
    details["error_kind"] = json!(err.kind());
    ctx.details = Some(details);
    audit_outcome(state, &ctx, "rejected");
    err
}

fn audit_outcome(state: &AppState, ctx: &AuditContext, outcome: &str) {
    if let Err(e) = state.store.append_audit(ctx, outcome) {
        tracing::error!(error = %e, action = %ctx.action, "failed to append audit row");
    }
}

/// Validate a client-provided id (`[A-Za-z0-9_-]{8,100}`).
pub(crate) fn is_valid_client_id(id: &str) -> bool {
    (8..=100).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Validate a taxonomy slug (`^[a-z0-9]+(-[a-z0-9]+)*$`).
pub(crate) fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    Some(layer.allow_origin(AllowOrigin::list(parsed)))
}

/// Assemble the full router over the shared state.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let max_body = state.config.max_body_bytes;
    let cors = cors_layer(&state.config.cors_allow_origins);

    let router = Router::new()
        .route("/health", get(health))
        .route("/register", post(registration::register))
        .route("/register/update", post(registration::register_update))
        .route("/agents", get(registration::list_agents))
        .route("/agents/{pubkey}", get(registration::get_agent))
        .route("/agents/{pubkey}/profile", get(profiles::agent_profile))
        .route("/attestations", post(attestations::submit_attestation))
        .route("/attestations/{id}", get(attestations::get_attestation))
        .route("/verify", post(attestations::verify_document))
        .route("/search", get(search::search_attestations))
        .route("/trust/who-attested/{pubkey}", get(search::who_attested))
        .route("/trust/attested-by/{pubkey}", get(search::attested_by))
        .route("/trust/analysis/{pubkey}", get(trust::trust_analysis))
        .route("/trust/rings", get(trust::rings_report))
        .route("/trust/network-health", get(trust::network_health_report))
        .route("/revoke", post(revocations::submit_revocation))
        .route("/dispute", post(revocations::submit_dispute))
        .route("/ownership/claim", post(ownership::claim))
        .route("/ownership/confirm", post(ownership::confirm))
        .route("/ownership/revoke", post(ownership::revoke))
        .route("/ownership/agent/{pubkey}", get(ownership::agent_ownership))
        .route("/integrity/baseline/set", post(integrity::set_baseline))
        .route("/integrity/check", post(integrity::check))
        .route("/integrity/status/{pubkey}", get(integrity::status))
        .route("/taxonomy", get(taxonomy::full_taxonomy))
        .route("/taxonomy/{domain}", get(taxonomy::domain_skills))
        .route("/taxonomy/domains", post(taxonomy::create_domain))
        .route(
            "/taxonomy/domains/{domain}/skills",
            post(taxonomy::create_skill),
        )
        .route("/taxonomy/domains/{domain}", delete(taxonomy::delete_domain))
        .route(
            "/taxonomy/domains/{domain}/skills/{skill}",
            delete(taxonomy::delete_skill),
        )
        .route("/risk/source-anomalies", get(risk::source_anomalies))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state);

    match cors {
        Some(layer) => router.layer(layer),
        None => router,
    }
}
