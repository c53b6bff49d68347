use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::db::DbHandle;
use super::models::{AssignmentRole, NewProcess, NewRecurringRule, NewStage, NewTicket, NewUser, TicketStatus};
use super::recurrence::RecurrenceEngine;
use super::report::ReportWindow;
use crate::config::{ReportConfig, WorkflowConfig};
use crate::errors::{DeskError, ErrorKind};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub engine: RecurrenceEngine,
    pub workflow: WorkflowConfig,
    pub reports: ReportConfig,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct MoveTicketRequest {
    pub stage_id: i64,
    pub moved_by: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TicketStatus,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub user_id: i64,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub user_id: i64,
    pub content: String,
}

#[derive(Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Deserialize)]
pub struct ReportQuery {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Serialize)]
pub struct MarkedRead {
    pub updated: usize,
}

// ── Response envelope ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok(data))
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    Internal(String),
}

impl From<DeskError> for ApiError {
    fn from(err: DeskError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => ApiError::NotFound(message),
            ErrorKind::PreconditionFailed => ApiError::Conflict(message),
            ErrorKind::Validation => ApiError::BadRequest(message),
            ErrorKind::Storage => ApiError::Internal(message),
        }
    }
}

/// Store plumbing returns `anyhow`; typed errors inside the chain keep
/// their status code.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        DeskError::from_storage(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (
            status,
            Json(serde_json::json!({"success": false, "message": message})),
        )
            .into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", get(get_user))
        .route("/api/users/{id}/notifications", get(list_notifications))
        .route("/api/users/{id}/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/{id}/read", post(mark_notification_read))
        .route("/api/processes", get(list_processes).post(create_process))
        .route("/api/processes/{id}", get(get_process))
        .route("/api/processes/{id}/stages", post(add_stage))
        .route("/api/tickets", post(create_ticket))
        .route("/api/tickets/{id}", get(get_ticket).delete(delete_ticket))
        .route("/api/tickets/{id}/move", post(move_ticket))
        .route("/api/tickets/{id}/status", patch(update_ticket_status))
        .route("/api/tickets/{id}/assignees", post(add_assignee))
        .route("/api/tickets/{id}/reviewers", post(add_reviewer))
        .route(
            "/api/tickets/{id}/comments",
            get(list_comments).post(add_comment),
        )
        .route("/api/recurring-rules", get(list_rules).post(create_rule))
        .route("/api/recurring-rules/{id}", get(get_rule))
        .route("/api/recurring-rules/{id}/execute", post(execute_rule))
        .route("/api/recurring-rules/{id}/deactivate", post(deactivate_rule))
        .route("/api/reports/user/{user_id}", get(user_report))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_users(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.call(|db| db.list_users()).await?;
    Ok(ok(users))
}

async fn create_user(
    State(state): State<SharedState>,
    Json(req): Json<NewUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.db.call(move |db| db.create_user(&req)).await?;
    Ok(created(user))
}

async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.call(move |db| db.get_user(id)).await? {
        Some(user) => Ok(ok(user)),
        None => Err(DeskError::UserNotFound { id }.into()),
    }
}

async fn list_notifications(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = state
        .db
        .call(move |db| {
            if db.get_user(user_id)?.is_none() {
                return Err(DeskError::UserNotFound { id: user_id }.into());
            }
            db.list_notifications(user_id, query.unread_only)
        })
        .await?;
    Ok(ok(notifications))
}

async fn mark_all_read(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .db
        .call(move |db| {
            if db.get_user(user_id)?.is_none() {
                return Err(DeskError::UserNotFound { id: user_id }.into());
            }
            db.mark_all_notifications_read(user_id)
        })
        .await?;
    Ok(ok(MarkedRead { updated }))
}

async fn mark_notification_read(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = state.db.call(move |db| db.mark_notification_read(id)).await?;
    Ok(ok(notification))
}

async fn list_processes(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let processes = state.db.call(|db| db.list_processes()).await?;
    Ok(ok(processes))
}

async fn create_process(
    State(state): State<SharedState>,
    Json(req): Json<NewProcess>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.workflow.clone();
    let detail = state
        .db
        .call(move |db| db.create_process(&req, &workflow))
        .await?;
    Ok(created(detail))
}

async fn get_process(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.call(move |db| db.get_process(id)).await? {
        Some(detail) => Ok(ok(detail)),
        None => Err(DeskError::ProcessNotFound { id }.into()),
    }
}

async fn add_stage(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<NewStage>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow = state.workflow.clone();
    let stage = state
        .db
        .call(move |db| db.add_stage(id, &req, &workflow))
        .await?;
    Ok(created(stage))
}

async fn create_ticket(
    State(state): State<SharedState>,
    Json(req): Json<NewTicket>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state.db.call(move |db| db.create_ticket(&req)).await?;
    Ok(created(ticket))
}

async fn get_ticket(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.call(move |db| db.get_ticket_detail(id)).await? {
        Some(detail) => Ok(ok(detail)),
        None => Err(DeskError::TicketNotFound { id }.into()),
    }
}

async fn delete_ticket(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.call(move |db| db.delete_ticket(id)).await? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(DeskError::TicketNotFound { id }.into()),
    }
}

async fn move_ticket(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<MoveTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state
        .db
        .call(move |db| db.move_ticket(id, req.stage_id, req.moved_by))
        .await?;
    Ok(ok(ticket))
}

async fn update_ticket_status(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state
        .db
        .call(move |db| db.update_ticket_status(id, req.status))
        .await?;
    Ok(ok(ticket))
}

async fn add_assignee(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let assignment = state
        .db
        .call(move |db| db.assign_user(id, req.user_id, AssignmentRole::Assignee))
        .await?;
    Ok(created(assignment))
}

async fn add_reviewer(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let assignment = state
        .db
        .call(move |db| db.assign_user(id, req.user_id, AssignmentRole::Reviewer))
        .await?;
    Ok(created(assignment))
}

async fn list_comments(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = state
        .db
        .call(move |db| {
            if db.get_ticket(id)?.is_none() {
                return Err(DeskError::TicketNotFound { id }.into());
            }
            db.list_comments(id)
        })
        .await?;
    Ok(ok(comments))
}

async fn add_comment(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .db
        .call(move |db| db.add_comment(id, req.user_id, &req.content))
        .await?;
    Ok(created(comment))
}

async fn list_rules(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let rules = state.db.call(|db| db.list_rules()).await?;
    Ok(ok(rules))
}

async fn create_rule(
    State(state): State<SharedState>,
    Json(req): Json<NewRecurringRule>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state.db.call(move |db| db.create_rule(&req)).await?;
    Ok(created(rule))
}

async fn get_rule(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.call(move |db| db.get_rule(id)).await? {
        Some(rule) => Ok(ok(rule)),
        None => Err(DeskError::RuleNotFound { id }.into()),
    }
}

async fn deactivate_rule(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let rule = state.db.call(move |db| db.deactivate_rule(id)).await?;
    Ok(ok(rule))
}

async fn execute_rule(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = state.engine.clone();
    let outcome = state
        .db
        .call(move |db| engine.execute_rule(db, id, Utc::now()))
        .await?;
    Ok(ok(outcome))
}

async fn user_report(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = ReportWindow::parse(query.date_from.as_deref(), query.date_to.as_deref())?;
    let config = state.reports.clone();
    let report = state
        .db
        .call(move |db| db.build_user_report(user_id, &window, &config, Utc::now()))
        .await?;
    Ok(ok(report))
}
