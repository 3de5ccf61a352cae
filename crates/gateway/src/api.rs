//! HTTP API — chat, streaming chat, and session inspection.
//!
//! Endpoints:
//!
//! - `POST   /chat`                 — Send a message, get the final answer
//! - `POST   /chat/stream`          — Send a message, get an SSE stream
//! - `GET    /sessions/{id}/usage`  — Token ledger of one session
//! - `DELETE /sessions/{id}`        — Drop a session
//! - `GET    /health`               — Liveness

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{delete, get, post},
};
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{error, info, warn};

use leadline_agent::StreamEvent;
use leadline_core::error::ProfileError;
use leadline_core::ledger::LedgerSnapshot;
use leadline_core::profile::AgentProfile;

use crate::SharedState;

/// Build the API router.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/sessions/{id}/usage", get(usage_handler))
        .route("/sessions/{id}", delete(delete_session_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Doubles as the session id.
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(rename = "tokenUsage")]
    pub token_usage: TokenUsage,
}

/// Payload of the terminal `done` SSE event.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamDone {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "tokenUsage")]
    pub token_usage: TokenUsage,
    pub accuracy: leadline_core::provider::UsageAccuracy,
    pub invocations: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn message_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Profile resolution ────────────────────────────────────────────────────

/// The profile for a message: cached on the session if it exists, otherwise
/// resolved, otherwise a fallback built from the id.
async fn resolve_profile(state: &SharedState, agent_id: &str) -> AgentProfile {
    if let Some(session) = state.engine.sessions().get(agent_id) {
        return session.profile();
    }

    match state.profiles.resolve(agent_id).await {
        Ok(profile) => profile,
        Err(ProfileError::NotFound(_)) => {
            warn!(agent_id = %agent_id, "Profile not found, using fallback");
            AgentProfile::fallback(agent_id)
        }
        Err(e) => {
            warn!(agent_id = %agent_id, error = %e, "Profile lookup failed, using fallback");
            AgentProfile::fallback(agent_id)
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        sessions: state.engine.sessions().len(),
    })
}

/// `POST /chat` — run one dispatch round and return the answer.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.agent_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "agentId must not be empty"));
    }
    info!(agent_id = %payload.agent_id, message_len = payload.message.len(), "chat request");

    let profile = resolve_profile(&state, &payload.agent_id).await;
    let result = state
        .engine
        .process_message(&payload.agent_id, profile, &payload.message)
        .await
        .map_err(|e| {
            error!(agent_id = %payload.agent_id, error = %e, "Chat processing failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {e}"),
            )
        })?;

    Ok(Json(ChatResponse {
        message: ChatMessage {
            id: message_id(),
            role: "assistant".into(),
            content: result.final_text,
            created_at: timestamp(),
        },
        token_usage: TokenUsage::new(result.request_input_tokens, result.request_output_tokens),
    }))
}

/// `POST /chat/stream` — run one dispatch round as Server-Sent Events.
///
/// Event names: `chunk`, `fetching`, then `done` or `error`.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let events: BoxStream<'static, StreamEvent> = if !state.enable_streaming {
        stream::once(async {
            StreamEvent::Error {
                message: "Streaming is disabled in configuration".into(),
            }
        })
        .boxed()
    } else if payload.agent_id.trim().is_empty() {
        stream::once(async {
            StreamEvent::Error {
                message: "agentId must not be empty".into(),
            }
        })
        .boxed()
    } else {
        info!(agent_id = %payload.agent_id, message_len = payload.message.len(), "chat stream request");
        let profile = resolve_profile(&state, &payload.agent_id).await;
        state
            .engine
            .stream_message(&payload.agent_id, profile, payload.message)
            .boxed()
    };

    let message_id = message_id();
    let created_at = timestamp();
    let stream = events.map(move |event| Ok(to_sse(&event, &message_id, &created_at)));

    Sse::new(stream)
}

fn to_sse(event: &StreamEvent, message_id: &str, created_at: &str) -> SseEvent {
    let data = match event {
        StreamEvent::Done {
            input_tokens,
            output_tokens,
            accuracy,
            invocations,
            ..
        } => serde_json::to_string(&StreamDone {
            message_id: message_id.to_string(),
            created_at: created_at.to_string(),
            token_usage: TokenUsage::new(*input_tokens, *output_tokens),
            accuracy: *accuracy,
            invocations: *invocations,
        }),
        StreamEvent::Error { message } => serde_json::to_string(&ErrorResponse {
            error: message.clone(),
        }),
        other => serde_json::to_string(other),
    };

    SseEvent::default()
        .event(event.event_type())
        .data(data.unwrap_or_default())
}

/// `GET /sessions/{id}/usage` — the session's cumulative token ledger.
async fn usage_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<LedgerSnapshot>, ApiError> {
    state
        .engine
        .sessions()
        .get(&id)
        .map(|session| Json(session.ledger()))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown session: {id}")))
}

/// `DELETE /sessions/{id}` — forget a session and its history.
async fn delete_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.engine.sessions().remove(&id) {
        Some(_) => {
            info!(session_id = %id, "Session removed");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown session: {id}"),
        )),
    }
}
