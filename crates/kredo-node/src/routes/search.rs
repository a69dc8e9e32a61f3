//! Attestation search and trust-graph listing.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use kredo_store::{AttestationFilter, Page};

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    subject: Option<String>,
    attestor: Option<String>,
    domain: Option<String>,
    skill: Option<String>,
    r#type: Option<String>,
    min_proficiency: Option<u8>,
    #[serde(default)]
    include_revoked: bool,
    limit: Option<u32>,
    offset: Option<u32>,
}

/// `GET /search` — all filters pushed down to the store.
pub(crate) async fn search_attestations(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let filter = AttestationFilter {
        subject: query.subject,
        attestor: query.attestor,
        domain: query.domain,
        skill: query.skill,
        attestation_type: query.r#type,
        min_proficiency: query.min_proficiency,
        include_revoked: query.include_revoked,
    };
    let page = Page::clamped(query.limit, query.offset);

    let results = state.store.search_attestations(&filter, page)?;
    let total = state.store.count_attestations(&filter)?;

    Ok(Json(json!({
        "attestations": results,
        "total": total,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// `GET /trust/who-attested/{pubkey}` — attestors for a subject.
pub(crate) async fn who_attested(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> ApiResult<Json<Value>> {
    let attestors = state.store.attestors_for(&pubkey)?;
    Ok(Json(json!({
        "subject": pubkey,
        "count": attestors.len(),
        "attestors": attestors,
    })))
}

/// `GET /trust/attested-by/{pubkey}` — subjects attested by a key.
pub(crate) async fn attested_by(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> ApiResult<Json<Value>> {
    let subjects = state.store.attested_by(&pubkey)?;
    Ok(Json(json!({
        "attestor": pubkey,
        "count": subjects.len(),
        "subjects": subjects,
    })))
}
