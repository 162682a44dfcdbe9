use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;

use super::domain::SubjectRef;
use super::orchestrator::OrchestratorError;
use super::ports::{ContentFetcher, VerificationBackend, WorkSource};
use super::service::ReviewService;
use super::settings::SettingsUpdate;

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LimitParams {
    limit: Option<usize>,
}

impl LimitParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SubjectParams {
    name: Option<String>,
}

/// Router exposing the administrative surface of the review orchestrator.
pub fn review_router<S, F, B>(service: Arc<ReviewService<S, F, B>>) -> Router
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    Router::new()
        .route("/api/v1/review/status", get(status_handler::<S, F, B>))
        .route(
            "/api/v1/review/runs",
            get(history_handler::<S, F, B>).post(start_run_handler::<S, F, B>),
        )
        .route(
            "/api/v1/review/runs/:run_id",
            get(run_detail_handler::<S, F, B>),
        )
        .route("/api/v1/review/logs", get(logs_handler::<S, F, B>))
        .route(
            "/api/v1/review/config",
            get(settings_handler::<S, F, B>).put(update_settings_handler::<S, F, B>),
        )
        .route("/api/v1/review/results", get(results_handler::<S, F, B>))
        .route(
            "/api/v1/review/results/:subject_id",
            get(result_handler::<S, F, B>),
        )
        .route(
            "/api/v1/review/scheduler/start",
            post(start_scheduler_handler::<S, F, B>),
        )
        .route(
            "/api/v1/review/scheduler/stop",
            post(stop_scheduler_handler::<S, F, B>),
        )
        .route(
            "/api/v1/review/subjects/:subject_id/verify",
            post(verify_subject_handler::<S, F, B>),
        )
        .with_state(service)
}

fn error_response(error: OrchestratorError) -> Response {
    AppError::from(error).into_response()
}

pub(crate) async fn status_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    let status = service.status().await;
    (StatusCode::OK, axum::Json(status)).into_response()
}

pub(crate) async fn history_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
    Query(params): Query<LimitParams>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    let runs = service.history(params.limit());
    (StatusCode::OK, axum::Json(runs)).into_response()
}

pub(crate) async fn start_run_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    match service.start_batch() {
        Ok(run_id) => {
            let payload = json!({ "run_id": run_id.0, "status": "running" });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn run_detail_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
    Path(run_id): Path<String>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    match service.run_detail(&run_id) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn logs_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
    Query(params): Query<LimitParams>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    let entries = service.logs(params.limit());
    (StatusCode::OK, axum::Json(entries)).into_response()
}

pub(crate) async fn settings_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    (StatusCode::OK, axum::Json(service.settings())).into_response()
}

pub(crate) async fn update_settings_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
    axum::Json(update): axum::Json<SettingsUpdate>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    match service.update_settings(update).await {
        Ok(settings) => (StatusCode::OK, axum::Json(settings)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn results_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    (StatusCode::OK, axum::Json(service.cached_results())).into_response()
}

pub(crate) async fn result_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
    Path(subject_id): Path<String>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    match service.cached_result(&subject_id) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn start_scheduler_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    match service.start_scheduler().await {
        Ok(started) => {
            let payload = json!({ "active": true, "changed": started });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn stop_scheduler_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    match service.stop_scheduler().await {
        Ok(stopped) => {
            let payload = json!({ "active": false, "changed": stopped });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn verify_subject_handler<S, F, B>(
    State(service): State<Arc<ReviewService<S, F, B>>>,
    Path(subject_id): Path<String>,
    Query(params): Query<SubjectParams>,
) -> Response
where
    S: WorkSource + 'static,
    F: ContentFetcher + 'static,
    B: VerificationBackend + 'static,
{
    let name = params.name.unwrap_or_else(|| subject_id.clone());
    match service.verify_subject(SubjectRef::new(subject_id, name)).await {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}
