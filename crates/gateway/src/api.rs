//! HTTP API, nested under `/api` behind the auth middleware.
//!
//! Endpoints:
//!
//! - `POST /api/chat`        Stream a chat turn as SSE frames
//! - `GET  /api/chats`       List the caller's conversations
//! - `GET  /api/chats/{id}`  Get one of the caller's conversations

use std::convert::Infallible;

use axum::{
    Extension, Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use deepsearch_core::identity::UserId;
use deepsearch_core::message::{Conversation, ConversationId, ConversationSummary};

use crate::SharedState;
use crate::frame;
use crate::orchestrator::ChatRequest;

/// Frames buffered between the orchestrator and the HTTP body.
const FRAME_BUFFER: usize = 64;

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chats", get(list_chats_handler))
        .route("/chats/{id}", get(get_chat_handler))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatListResponse {
    pub chats: Vec<ConversationSummary>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// `POST /api/chat` runs the agent and streams frames back as SSE.
///
/// The orchestrator runs on its own task; when the client goes away the
/// body stream is dropped, which the orchestrator observes and cancels.
async fn chat_handler(
    State(state): State<SharedState>,
    Extension(user_id): Extension<UserId>,
    Json(request): Json<ChatRequest>,
) -> Result<
    Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>,
    (StatusCode, Json<ErrorResponse>),
> {
    if request.messages.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "messages must not be empty",
        ));
    }
    if request
        .conversation_id
        .as_ref()
        .is_some_and(|id| id.as_str().trim().is_empty())
    {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "conversationId must not be empty",
        ));
    }
    info!(
        user_id = %user_id,
        messages = request.messages.len(),
        continuing = request.conversation_id.is_some(),
        "Chat request"
    );

    let (sink, rx) = frame::channel(FRAME_BUFFER);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let _ = orchestrator
            .run(user_id, request, sink, CancellationToken::new())
            .await;
    });

    let stream = ReceiverStream::new(rx)
        .map(|frame| Ok(SseEvent::default().event(frame.kind()).data(frame.data())));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_chats_handler(
    State(state): State<SharedState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<ChatListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let chats = state.store.list(&user_id).await.map_err(|e| {
        error!(error = %e, user_id = %user_id, "Failed to list conversations");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list conversations")
    })?;
    Ok(Json(ChatListResponse { chats }))
}

/// Absent and not-owned are both 404.
async fn get_chat_handler(
    State(state): State<SharedState>,
    Extension(user_id): Extension<UserId>,
    Path(id): Path<String>,
) -> Result<Json<Conversation>, (StatusCode, Json<ErrorResponse>)> {
    let conversation = state
        .store
        .get(&ConversationId(id), &user_id)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user_id, "Failed to load conversation");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load conversation")
        })?;
    conversation
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Conversation not found"))
}
