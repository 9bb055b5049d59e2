//! HTTP routes over the forecast pipeline.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

use crate::drift::DriftError;
use crate::pipeline::{ForecastPipeline, PipelineError, PredictRequest, ReportRequest};

pub fn forecast_router(pipeline: Arc<ForecastPipeline>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/predict", post(post_predict))
        .route("/report", post(post_report))
        .route("/drift", get(get_latest_drift))
        .with_state(ForecastAppState { pipeline })
}

/// Status code for a pipeline failure.
pub fn status_for(err: &PipelineError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if err.is_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else if err.is_insufficient_history() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else if matches!(err, PipelineError::Drift(DriftError::ReportNotFound { .. })) {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

struct ApiError(PipelineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(
                component = "http",
                event = "http.request.error",
                status = status.as_u16(),
                error = %self.0
            );
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

#[derive(Clone)]
struct ForecastAppState {
    pipeline: Arc<ForecastPipeline>,
}

async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn post_predict(
    State(state): State<ForecastAppState>,
    Json(req): Json<PredictRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        component = "http",
        event = "http.predict.request",
        timestamp = req.timestamp.as_str()
    );
    Ok(Json(state.pipeline.predict(&req)?))
}

async fn post_report(
    State(state): State<ForecastAppState>,
    Json(req): Json<ReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        component = "http",
        event = "http.report.request",
        timestamp = req.timestamp.as_str()
    );
    Ok(Json(state.pipeline.report(&req)?))
}

async fn get_latest_drift(
    State(state): State<ForecastAppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.pipeline.latest_drift_report()?))
}
