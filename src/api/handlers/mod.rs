use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::engine::{Assistant, HealthReport, TurnError, TurnRequest};
use crate::models::*;

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_body(code: StatusCode, status: &str, message: impl Into<String>) -> ApiError {
    (
        code,
        Json(ErrorBody {
            status: status.to_string(),
            message: message.into(),
        }),
    )
}

/// Maps a turn failure to an HTTP error.
///
/// Caller mistakes are reported as-is. Internal failures are logged in full
/// and the client only sees a generic message.
fn turn_error(e: TurnError) -> ApiError {
    let code = match &e {
        TurnError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        TurnError::SessionAlreadyComplete(_) | TurnError::NotAwaitingInput(_) => {
            StatusCode::CONFLICT
        }
        TurnError::MalformedRecord(_) | TurnError::Store(_) => {
            tracing::error!("Internal error: {}", e);
            return error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.status(),
                "Internal server error",
            );
        }
    };
    tracing::warn!("Rejected request: {}", e);
    error_body(code, e.status(), e.to_string())
}

fn bad_request(message: &str) -> ApiError {
    error_body(StatusCode::BAD_REQUEST, "invalid_request", message)
}

// ============================================================
// Health
// ============================================================

pub async fn health(
    State(assistant): State<Arc<Assistant>>,
) -> Result<Json<HealthReport>, ApiError> {
    assistant.health().await.map(Json).map_err(turn_error)
}

// ============================================================
// Turns
// ============================================================

#[derive(Debug, Deserialize)]
pub struct TurnInput {
    pub text: String,
    pub session_id: Option<SessionId>,
    pub workspace_hint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerInput {
    pub answer: String,
}

pub async fn process_turn(
    State(assistant): State<Arc<Assistant>>,
    Json(input): Json<TurnInput>,
) -> Result<Json<TurnResponse>, ApiError> {
    if input.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let request = TurnRequest {
        session_id: input.session_id,
        text: input.text,
        workspace_hint: input.workspace_hint,
    };
    assistant
        .process_turn(request)
        .await
        .map(Json)
        .map_err(turn_error)
}

pub async fn answer(
    State(assistant): State<Arc<Assistant>>,
    Path(id): Path<String>,
    Json(input): Json<AnswerInput>,
) -> Result<Json<TurnResponse>, ApiError> {
    if input.answer.trim().is_empty() {
        return Err(bad_request("answer must not be empty"));
    }

    assistant
        .resume(&SessionId::from(id), &input.answer)
        .await
        .map(Json)
        .map_err(turn_error)
}

// ============================================================
// Sessions
// ============================================================

pub async fn list_sessions(
    State(assistant): State<Arc<Assistant>>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    assistant.list_sessions().map(Json).map_err(turn_error)
}

pub async fn get_session(
    State(assistant): State<Arc<Assistant>>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    assistant
        .session_info(&SessionId::from(id))
        .map(Json)
        .map_err(turn_error)
}

pub async fn delete_session(
    State(assistant): State<Arc<Assistant>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = SessionId::from(id);
    if assistant.delete_session(&id).await.map_err(turn_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(turn_error(TurnError::SessionNotFound(id)))
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpireInput {
    pub idle_minutes: u32,
}

pub async fn expire_sessions(
    State(assistant): State<Arc<Assistant>>,
    Json(input): Json<ExpireInput>,
) -> Result<Json<ExpireSessionsResponse>, ApiError> {
    let max_idle = chrono::Duration::minutes(i64::from(input.idle_minutes));
    let expired = assistant.expire_idle(max_idle).await.map_err(turn_error)?;
    let remaining = assistant.list_sessions().map_err(turn_error)?.len();
    Ok(Json(ExpireSessionsResponse { expired, remaining }))
}
