//! API route definitions

use std::sync::Arc;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use super::{handlers, state::AppState, ServerConfig};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "kind": "not_found",
            "message": "Not found. See /api/capabilities for the available operations.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "kind": "method_not_allowed",
            "message": "Method not allowed for this route.",
        })),
    )
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let api_routes = Router::new()
        // Dataset
        .route("/upload", post(handlers::upload_data))
        .route("/dataset", get(handlers::get_dataset).delete(handlers::clear_dataset))
        .route("/dataset/preview", get(handlers::get_preview))
        .route("/dataset/columns/:name/stats", get(handlers::get_column_stats))
        // Transforms
        .route("/transform", post(handlers::transform_column))
        // Statistics
        .route("/statistics", post(handlers::compute_statistics))
        .route("/correlations", post(handlers::compute_correlations))
        // Models
        .route("/predict", post(handlers::fit_model))
        // Finance
        .route("/risk-metrics", post(handlers::compute_risk_metrics))
        .route("/optimize-portfolio", post(handlers::optimize_portfolio))
        .route("/backtest", post(handlers::run_backtest))
        // System
        .route("/capabilities", get(handlers::capabilities))
        .route("/health", get(handlers::health_check))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405);

    let cors = match config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Some(Err(e)) => {
            warn!(error = %e, "Invalid CORS origin, allowing any origin");
            CorsLayer::permissive()
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    Router::new()
        .nest("/api", api_routes)
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
