//! HTTP control surface.
//!
//! Handlers are thin: each maps one orchestrator operation to a JSON body and
//! a status code. Precondition failures are `409`; a resume whose baseline
//! repair exhausted its retries is `503`; a clean that could not remove or
//! recreate everything is `500`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tracing::{error, info};

use crate::health::{AutoReinitHealth, HealthAggregator, HealthSnapshot};
use crate::lifecycle::{LifecycleError, Transition};
use crate::logs::{LogParams, LogQuery, LogReader};
use crate::models::format_timestamp;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    health: HealthAggregator,
    logs: LogReader,
}

impl AppState {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let health = orchestrator.health();
        let logs = LogReader::new(orchestrator.layout().log_file());
        Self {
            orchestrator,
            health,
            logs,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(health))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/clean", post(clean))
        .route("/logs", get(logs))
        .with_state(state)
}

fn now(state: &AppState) -> String {
    format_timestamp(state.orchestrator.clock().now())
}

fn rejected(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": error, "message": message }))).into_response()
}

fn lifecycle_rejection(err: &LifecycleError) -> Response {
    match err {
        LifecycleError::NotPaused { .. } => rejected(StatusCode::CONFLICT, "pause_required", &err.to_string()),
        LifecycleError::ShuttingDown => rejected(StatusCode::CONFLICT, "shutting_down", &err.to_string()),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}

async fn pause(State(state): State<AppState>) -> Response {
    match state.orchestrator.pause() {
        Ok(transition) => {
            let message = match transition {
                Transition::Changed => "Generation paused",
                Transition::Unchanged => "Generation already paused",
            };
            Json(json!({
                "success": true,
                "action": "pause",
                "status": "paused",
                "message": message,
                "timestamp": now(&state),
            }))
            .into_response()
        }
        Err(err) => lifecycle_rejection(&err),
    }
}

async fn resume(State(state): State<AppState>) -> Response {
    let outcome = match state.orchestrator.resume().await {
        Ok(outcome) => outcome,
        Err(err) => return lifecycle_rejection(&err),
    };
    let auto_reinit = AutoReinitHealth::from(&state.orchestrator.state().committed().auto_reinit);

    match outcome.baseline {
        None => Json(json!({
            "success": true,
            "action": "resume",
            "status": "running",
            "message": "Generation already running",
            "timestamp": now(&state),
            "auto_reinit": auto_reinit,
        }))
        .into_response(),
        Some(Ok(report)) => {
            let message = if report.performed {
                "Generation resumed, baseline regenerated"
            } else {
                "Generation resumed"
            };
            info!(performed = report.performed, "Resume request completed");
            Json(json!({
                "success": true,
                "action": "resume",
                "status": "running",
                "message": message,
                "timestamp": now(&state),
                "auto_reinit": auto_reinit,
                "baseline": report,
            }))
            .into_response()
        }
        Some(Err(err)) => {
            error!(error = %err, "Resume completed in degraded mode");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "action": "resume",
                    "status": "running",
                    "error": "baseline_degraded",
                    "message": err.to_string(),
                    "timestamp": now(&state),
                    "auto_reinit": auto_reinit,
                    "baseline": err.report(),
                })),
            )
                .into_response()
        }
    }
}

async fn clean(State(state): State<AppState>) -> Response {
    match state.orchestrator.clean().await {
        Ok(report) => {
            let success = report.errors.is_empty();
            let status = if success {
                StatusCode::OK
            } else {
                error!(errors = report.errors.len(), "Clean left artifacts behind");
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(json!({
                    "success": success,
                    "action": "clean",
                    "deleted_count": report.deleted_count(),
                    "deleted": report.deleted,
                    "errors": report.errors,
                    "timestamp": now(&state),
                })),
            )
                .into_response()
        }
        Err(err) => lifecycle_rejection(&err),
    }
}

async fn logs(State(state): State<AppState>, Query(params): Query<LogParams>) -> Response {
    let query = LogQuery::from(&params);
    match state.logs.query(query) {
        Ok(page) => Json(page).into_response(),
        Err(err) => {
            error!(error = %err, "Failed to read log file");
            rejected(StatusCode::INTERNAL_SERVER_ERROR, "log_read_failed", &err.to_string())
        }
    }
}
