//! HTTP surface of the worker

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use runbox::{ExecutionRequest, ExecutionResult, Language, Runner};
use serde::Serialize;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    runner: Arc<Runner>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    language: Language,
}

/// Build the router serving `/execute` and `/health`
pub fn router(runner: Runner) -> Router {
    let max_body_bytes = runner.config().server.max_body_bytes;
    let state = AppState {
        runner: Arc::new(runner),
    };

    Router::new()
        .route("/execute", post(execute))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        language: state.runner.language(),
    })
}

/// Run a job. Every processed job is a 200; only requests that cannot be
/// processed get another status, with the reason in `runtime_error`.
async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected malformed request");
            let status = match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            let body = ExecutionResult::job_failed(rejection.body_text());
            return (status, Json(body)).into_response();
        }
    };

    match state.runner.execute(&request).await {
        Ok(result) => {
            info!(
                passed = result.passed_count(),
                total = result.results.len(),
                compile_error = result.compile_error.is_some(),
                "execute request done"
            );
            Json(result).into_response()
        }
        Err(e) => {
            warn!(error = %e, "rejected invalid request");
            let body = ExecutionResult::job_failed(e.to_string());
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
    }
}
