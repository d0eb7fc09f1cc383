//! REST endpoints driving the outreach workflow.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::batch::{EXPORT_FILE_NAME, EXPORT_MIME_TYPE};
use crate::campaign::CampaignParameters;
use crate::error::WorkflowError;
use crate::generation::Scope;

use super::manager::SessionManager;

/// Shared state for the workflow routes.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

/// A workflow error rendered as `{"error": ...}` with a matching status.
pub struct ApiError(WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            WorkflowError::CredentialRequired(_) => StatusCode::UNAUTHORIZED,
            WorkflowError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::InvalidTransition { .. }
            | WorkflowError::NoBatch
            | WorkflowError::NothingToReview => StatusCode::CONFLICT,
            WorkflowError::Provider(_) => StatusCode::BAD_GATEWAY,
            WorkflowError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
struct CredentialBody {
    api_key: String,
}

#[derive(Deserialize)]
struct CampaignBody {
    goal: String,
    field: String,
    sender_bio: String,
}

#[derive(Deserialize, Default)]
struct GenerateQuery {
    #[serde(default)]
    scope: Scope,
}

#[derive(Deserialize)]
struct SendBody {
    confirm: bool,
}

#[derive(Deserialize)]
struct PageBody {
    page: String,
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "outreach"}))
}

/// POST /api/sessions
async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let (_, handle) = state.sessions.create().await;
    let snapshot = handle.lock().await.snapshot();
    (StatusCode::CREATED, Json(snapshot))
}

/// GET /api/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.sessions.get(id).await?;
    let snapshot = handle.lock().await.snapshot();
    Ok(Json(snapshot))
}

/// DELETE /api/sessions/{id}
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(WorkflowError::SessionNotFound(id).into())
    }
}

/// POST /api/sessions/{id}/credential
async fn submit_credential(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CredentialBody>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.sessions.get(id).await?;
    let mut session = handle.lock().await;
    session.submit_credential(SecretString::from(body.api_key))?;
    Ok(Json(session.snapshot()))
}

/// POST /api/sessions/{id}/campaign
async fn set_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CampaignBody>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.sessions.get(id).await?;
    let mut session = handle.lock().await;
    session.set_campaign(CampaignParameters::new(body.goal, body.field, body.sender_bio))?;
    Ok(Json(session.snapshot()))
}

/// POST /api/sessions/{id}/upload
///
/// The request body is the raw CSV file.
async fn upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let handle = state.sessions.get(id).await?;
    let summary = handle.lock().await.upload(&body)?;
    Ok(Json(summary))
}

/// POST /api/sessions/{id}/generate?scope=all|outstanding
async fn generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<GenerateQuery>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.sessions.get(id).await?;
    let report = handle.lock().await.generate(query.scope).await?;
    let summary = report.summary();
    Ok(Json(serde_json::json!({"summary": summary, "report": report})))
}

/// GET /api/sessions/{id}/review
async fn review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.sessions.get(id).await?;
    let review = handle.lock().await.review().await?;
    Ok(Json(review))
}

/// GET /api/sessions/{id}/export
async fn export(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Response> {
    let handle = state.sessions.get(id).await?;
    let bytes = handle.lock().await.export()?;
    let disposition = format!("attachment; filename=\"{EXPORT_FILE_NAME}\"");
    Ok((
        [
            (header::CONTENT_TYPE, EXPORT_MIME_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// POST /api/sessions/{id}/send
async fn send(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendBody>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.sessions.get(id).await?;
    let outcome = handle.lock().await.answer_send_prompt(body.confirm).await?;
    Ok(Json(outcome))
}

/// POST /api/sessions/{id}/page
async fn switch_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PageBody>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.sessions.get(id).await?;
    let switched = handle.lock().await.switch_page(&body.page);
    Ok(Json(serde_json::json!({"switched": switched})))
}

/// Build the workflow REST routes.
pub fn session_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/credential", post(submit_credential))
        .route("/api/sessions/{id}/campaign", post(set_campaign))
        .route("/api/sessions/{id}/upload", post(upload))
        .route("/api/sessions/{id}/generate", post(generate))
        .route("/api/sessions/{id}/review", get(review))
        .route("/api/sessions/{id}/export", get(export))
        .route("/api/sessions/{id}/send", post(send))
        .route("/api/sessions/{id}/page", post(switch_page))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
