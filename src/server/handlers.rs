//! HTTP request handlers

use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, Multipart, Path, Query, State,
    },
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::data::load_bytes;
use crate::finance::{BacktestRequest, PortfolioMethod, PortfolioRequest, RiskRequest, Strategy};
use crate::preprocessing::TransformSpec;
use crate::stats::CorrelationMethod;
use crate::training::{self, FitRequest, ModelSpec};

use super::error::{Result, ServerError};
use super::state::AppState;

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

/// Body for requests whose fields are all optional: an empty body is the default
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ServerError::BadRequest(format!("Failed to parse the request body as JSON: {}", e)))
}

// ============================================================================
// Dataset Handlers
// ============================================================================

/// Upload a CSV or spreadsheet from the multipart field `file`
pub async fn upload_data(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>> {
    let mut multipart = multipart.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart.next_field().await? {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ServerError::BadRequest("file field has no filename".to_string()))?;
        let data = field.bytes().await?;
        info!(file = %file_name, bytes = data.len(), "Received upload");

        // Parse outside the lock so readers are not blocked by a large file
        let name = file_name.clone();
        let dataset = tokio::task::spawn_blocking(move || load_bytes(&data, &name))
            .await
            .map_err(|e| ServerError::Internal(format!("upload task failed: {}", e)))??;

        let summary = dataset.describe(state.config.preview_rows);
        state.session.write().await.replace(dataset);
        info!(
            dataset_id = %summary.id,
            rows = summary.row_count,
            columns = summary.column_count,
            "Dataset loaded"
        );
        return Ok(Json(json!({
            "success": true,
            "dataset": summary,
        })));
    }

    Err(ServerError::BadRequest("No file uploaded, expected multipart field 'file'".to_string()))
}

pub async fn get_dataset(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let session = state.session.read().await;
    let summary = session.describe(state.config.preview_rows)?;
    Ok(Json(json!(summary)))
}

pub async fn clear_dataset(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.session.write().await.clear();
    if cleared {
        info!("Dataset cleared");
    }
    Json(json!({ "success": true, "cleared": cleared }))
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    rows: Option<usize>,
}

pub async fn get_preview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Value>> {
    let session = state.session.read().await;
    let rows = session.preview(query.rows.unwrap_or(10))?;
    let headers = session.dataset()?.headers();
    Ok(Json(json!({
        "headers": headers,
        "rows": rows.len(),
        "data": rows,
    })))
}

pub async fn get_column_stats(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let stats = state.session.read().await.column_stats(&name)?;
    Ok(Json(json!({ "column": name, "stats": stats })))
}

// ============================================================================
// Transform Handler
// ============================================================================

#[derive(Deserialize)]
pub struct TransformRequest {
    column: String,
    transformation: String,
    #[serde(default)]
    params: Option<Value>,
}

pub async fn transform_column(
    State(state): State<Arc<AppState>>,
    body: JsonBody<TransformRequest>,
) -> Result<Json<Value>> {
    let Json(request) = body?;
    let summary = state
        .session
        .write()
        .await
        .transform(&request.column, &request.transformation, request.params)?;
    info!(
        column = %summary.column,
        transformation = summary.transformation,
        columns = summary.column_count,
        "Applied transformation"
    );
    Ok(Json(json!({ "success": true, "result": summary })))
}

// ============================================================================
// Statistics Handlers
// ============================================================================

#[derive(Deserialize, Default)]
pub struct StatisticsRequest {
    #[serde(default)]
    columns: Option<Vec<String>>,
}

pub async fn compute_statistics(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let request: StatisticsRequest = optional_json(&body)?;
    let summary = state.session.read().await.statistics(request.columns.as_deref())?;
    Ok(Json(json!(summary)))
}

#[derive(Deserialize, Default)]
pub struct CorrelationRequest {
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    method: Option<String>,
}

pub async fn compute_correlations(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>> {
    let request: CorrelationRequest = optional_json(&body)?;
    let result = state
        .session
        .read()
        .await
        .correlate(request.columns.as_deref(), request.method.as_deref())?;
    debug!(method = ?result.method, pairs = result.pairs.len(), "Computed correlations");
    Ok(Json(json!(result)))
}

// ============================================================================
// Model Handler
// ============================================================================

/// Fit a model on a snapshot of the dataset without holding the session lock
pub async fn fit_model(
    State(state): State<Arc<AppState>>,
    body: JsonBody<FitRequest>,
) -> Result<Json<Value>> {
    let Json(request) = body?;
    let dataset = state.session.read().await.dataset()?.clone();

    info!(
        model = %request.model,
        features = request.x_columns.len(),
        target = ?request.y_column,
        "Starting model fit"
    );
    let result = tokio::task::spawn_blocking(move || training::fit(&dataset, &request))
        .await
        .map_err(|e| ServerError::Internal(format!("fit task failed: {}", e)))??;

    Ok(Json(json!({ "success": true, "result": result })))
}

// ============================================================================
// Finance Handlers
// ============================================================================

pub async fn compute_risk_metrics(
    State(state): State<Arc<AppState>>,
    body: JsonBody<RiskRequest>,
) -> Result<Json<Value>> {
    let Json(request) = body?;
    let metrics = state.session.read().await.risk_metrics(&request)?;
    Ok(Json(json!(metrics)))
}

pub async fn optimize_portfolio(
    State(state): State<Arc<AppState>>,
    body: JsonBody<PortfolioRequest>,
) -> Result<Json<Value>> {
    let Json(request) = body?;
    let allocation = state.session.read().await.optimize_portfolio(&request)?;
    Ok(Json(json!(allocation)))
}

pub async fn run_backtest(
    State(state): State<Arc<AppState>>,
    body: JsonBody<BacktestRequest>,
) -> Result<Json<Value>> {
    let Json(request) = body?;
    let result = state.session.read().await.backtest(&request)?;
    Ok(Json(json!(result)))
}

// ============================================================================
// System Handlers
// ============================================================================

pub async fn capabilities() -> Json<Value> {
    Json(json!({
        "file_formats": ["csv", "xlsx", "xls", "xlsm", "ods"],
        "transformations": TransformSpec::SUPPORTED,
        "models": {
            "supervised": ModelSpec::SUPERVISED,
            "clustering": ModelSpec::CLUSTERING,
        },
        "correlation_methods": CorrelationMethod::ALL,
        "portfolio_methods": PortfolioMethod::ALL.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        "backtest_strategies": Strategy::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
    }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let dataset_loaded = state.session.read().await.has_dataset();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "dataset_loaded": dataset_loaded,
        "uptime_secs": state.uptime_secs(),
    }))
}
