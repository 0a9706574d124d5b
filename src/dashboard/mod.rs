//! Dashboard — Axum web server for read-only monitoring.
//!
//! Serves the leaderboard, agent profiles, and season counters as JSON.
//! The HTTP layer stays a thin collaborator over the aggregator's entry
//! points. CORS enabled for local development.

pub mod routes;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::leaderboard::Aggregator;

pub type AppState = Arc<Aggregator>;

/// Start the dashboard web server.
///
/// This spawns a background task; it doesn't block.
pub fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "Dashboard server starting on http://localhost:{port}");

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "Dashboard server error");
                }
            }
            Err(e) => error!(error = %e, port, "Failed to bind dashboard port"),
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().expect("static origin"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/leaderboard", get(routes::get_leaderboard))
        .route("/api/agents/:slug", get(routes::get_agent))
        .route("/api/season", get(routes::get_season))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PredictionStore;
    use crate::types::{Agent, Provider};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let store = PredictionStore::in_memory().await.unwrap();
        store
            .insert_agent(&Agent {
                id: "claude-opus".to_string(),
                display_name: "Claude Opus 4.6".to_string(),
                provider: Provider::Anthropic,
                model_id: "claude-opus-4-6".to_string(),
                slug: "claude".to_string(),
                color: "#E87040".to_string(),
                is_active: true,
            })
            .await
            .unwrap();
        Arc::new(Aggregator::new(store))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        // Error responses carry short plain-text bodies.
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state().await);
        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_leaderboard_endpoint() {
        let app = build_router(test_state().await);
        let (status, json) = get_json(app, "/api/leaderboard").await;
        assert_eq!(status, StatusCode::OK);
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["agent_id"], "claude-opus");
        assert_eq!(entries[0]["points"], 0);
    }

    #[tokio::test]
    async fn test_leaderboard_sort_param() {
        let app = build_router(test_state().await);
        let (status, _) = get_json(app, "/api/leaderboard?sort=brier").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_leaderboard_bad_sort_is_rejected() {
        let app = build_router(test_state().await);
        let (status, _) = get_json(app, "/api/leaderboard?sort=elo").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_agent_profile_endpoint() {
        let app = build_router(test_state().await);
        let (status, json) = get_json(app, "/api/agents/claude").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["agent"]["slug"], "claude");
        assert!(json["insights"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_agent_is_404() {
        let app = build_router(test_state().await);
        let (status, _) = get_json(app, "/api/agents/nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_season_endpoint() {
        let app = build_router(test_state().await);
        let (status, json) = get_json(app, "/api/season").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_matches"], 0);
    }
}
