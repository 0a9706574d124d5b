//! Dashboard route handlers.
//!
//! Thin JSON wrappers around the aggregator. Failures surface as short
//! machine-safe strings, never stack traces or internal details.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::AppState;
use crate::leaderboard::{AgentProfile, LeaderboardEntry, LeaderboardSort};
use crate::storage::SeasonTotals;

type RouteError = (StatusCode, String);

fn internal(e: anyhow::Error) -> RouteError {
    error!(error = %e, "Dashboard query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    sort: Option<String>,
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, RouteError> {
    let sort = match params.sort.as_deref() {
        None => LeaderboardSort::default(),
        Some(s) => s
            .parse()
            .map_err(|_| (StatusCode::BAD_REQUEST, format!("unknown sort: {s}")))?,
    };

    let entries = state.leaderboard(sort).await.map_err(internal)?;
    Ok(Json(entries))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<AgentProfile>, RouteError> {
    let profile = state.agent_profile(&slug).await.map_err(internal)?;
    match profile {
        Some(p) => Ok(Json(p)),
        None => Err((StatusCode::NOT_FOUND, "agent not found".to_string())),
    }
}

pub async fn get_season(
    State(state): State<AppState>,
) -> Result<Json<SeasonTotals>, RouteError> {
    let totals = state.season().await.map_err(internal)?;
    Ok(Json(totals))
}
