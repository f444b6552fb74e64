//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ActionResponse, ConversationListResponse, ConversationResponse, CreateConversationRequest,
    DraftRequest, ErrorResponse, NewChatResponse, SubmitTurnRequest, SuccessResponse,
};
use super::AppState;
use crate::runtime::EngineError;
use crate::state_machine::{ConversationView, Session};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/new", post(create_conversation))
        .route("/api/conversations/:id", get(get_conversation))
        .route("/api/conversations/:id/new-chat", post(new_chat))
        .route("/api/conversations/:id/end", post(end_conversation))
        // SSE streaming
        .route("/api/conversations/:id/stream", get(stream_conversation))
        // Engine operations
        .route("/api/conversations/:id/turns", post(submit_turn))
        .route("/api/conversations/:id/draft", put(update_draft))
        .route("/api/conversations/:id/retry", post(retry_submission))
        .route("/api/conversations/:id/reset", post(reset_conversation))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn list_conversations(State(state): State<AppState>) -> Json<ConversationListResponse> {
    Json(ConversationListResponse {
        conversations: state.runtime.list().await,
    })
}

async fn create_conversation(
    State(state): State<AppState>,
    req: Option<Json<CreateConversationRequest>>,
) -> Json<ConversationResponse> {
    let session = session_from(req.map(|Json(r)| r));
    let (conversation_id, handle) = state.runtime.create(session).await;

    Json(ConversationResponse {
        conversation_id,
        view: handle.view(),
    })
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationView>, AppError> {
    let handle = state.runtime.get(&id).await?;
    Ok(Json(handle.view()))
}

async fn new_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Option<Json<CreateConversationRequest>>,
) -> Result<Json<NewChatResponse>, AppError> {
    let session = session_from(req.map(|Json(r)| r));
    let chat = state.runtime.start_new_chat(&id, session).await?;

    if chat.warn_unsaved_history {
        tracing::info!(previous = %id, "Anonymous history discarded by new chat");
    }

    Ok(Json(NewChatResponse {
        view: chat.handle.view(),
        conversation_id: chat.conversation_id,
        warn_unsaved_history: chat.warn_unsaved_history,
    }))
}

async fn end_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.runtime.end(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

fn session_from(req: Option<CreateConversationRequest>) -> Session {
    match req.and_then(|r| r.user).filter(|u| !u.trim().is_empty()) {
        Some(user) => Session::user(user),
        None => Session::anonymous(),
    }
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.runtime.get(&id).await?;

    // Subscribe before reading the view so no update falls in between
    let broadcast_rx = handle.subscribe();
    Ok(sse_stream(handle.view(), broadcast_rx))
}

// ============================================================
// Engine Operations
// ============================================================

async fn submit_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubmitTurnRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let handle = state.runtime.get(&id).await?;
    let disposition = handle.submit_user_turn(req.text).await?;
    Ok(Json(disposition.into()))
}

async fn update_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DraftRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let handle = state.runtime.get(&id).await?;
    let disposition = handle.set_draft(req.text).await?;
    Ok(Json(disposition.into()))
}

async fn retry_submission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let handle = state.runtime.get(&id).await?;
    let disposition = handle.retry().await?;
    Ok(Json(disposition.into()))
}

async fn reset_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let handle = state.runtime.get(&id).await?;
    let disposition = handle.reset().await?;
    Ok(Json(disposition.into()))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("other-side ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Gone(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(_) | EngineError::InvalidTransition(_) => {
                AppError::BadRequest(e.to_string())
            }
            EngineError::NotFound(_) => AppError::NotFound(e.to_string()),
            EngineError::RuntimeStopped => AppError::Gone(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Gone(msg) => (StatusCode::GONE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
