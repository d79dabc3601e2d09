use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    error::EngineError,
    executor::Executor,
    middleware::log_requests,
    models::{ExecuteRequest, ExecutionOutcome},
};

pub const EXECUTE_PATH: &str = "/api/execution/executeCode";

#[derive(Clone)]
pub struct AppState {
    executor: Executor,
}

pub fn routes(executor: Executor, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route(
            EXECUTE_PATH,
            post(execute_code).fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(axum::middleware::from_fn(log_requests))
        .with_state(AppState { executor })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.executor.metrics().render_prometheus())
}

async fn execute_code(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<ExecutionOutcome, EngineError> {
    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            EngineError::BodyTooLarge(rejection.body_text())
        } else {
            EngineError::MalformedBody(rejection.body_text())
        }
    })?;
    state.executor.execute(request).await
}

async fn method_not_allowed() -> EngineError {
    EngineError::MethodNotAllowed
}
