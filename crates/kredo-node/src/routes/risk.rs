//! Anti-gaming risk signals derived from the audit log.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct AnomalyQuery {
    #[serde(default = "default_hours")]
    hours: u32,
    #[serde(default = "default_min_events")]
    min_events: u32,
    #[serde(default = "default_min_unique_actors")]
    min_unique_actors: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_hours() -> u32 {
    24
}
fn default_min_events() -> u32 {
    8
}
fn default_min_unique_actors() -> u32 {
    4
}
fn default_limit() -> u32 {
    100
}

/// `GET /risk/source-anomalies` — write events clustered by hashed
/// source IP. A risk signal only, never sole enforcement proof.
pub(crate) async fn source_anomalies(
    State(state): State<AppState>,
    Query(query): Query<AnomalyQuery>,
) -> ApiResult<Json<Value>> {
    let clusters = state.store.source_anomalies(
        query.hours,
        query.min_events,
        query.min_unique_actors,
        query.limit,
    )?;
    Ok(Json(json!({
        "window_hours": query.hours,
        "thresholds": {
            "min_events": query.min_events,
            "min_unique_actors": query.min_unique_actors,
        },
        "cluster_count": clusters.len(),
        "clusters": clusters,
    })))
}
