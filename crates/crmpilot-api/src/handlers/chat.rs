use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use crmpilot::{StreamEvent, TurnRequest};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::Session;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const THREAD_ID_HEADER: &str = "x-thread-id";

#[derive(Debug, Deserialize)]
pub struct AgentQuery {
    pub agent: Option<String>,
}

impl AgentQuery {
    fn agent(self) -> ApiResult<String> {
        self.agent
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("agent query parameter is required".to_string()))
    }
}

/// Message as sent by the chat client
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

impl ClientMessage {
    /// Plain string content, or the text parts of a multi-part message
    fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ClientMessage>,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewThreadResponse {
    pub id: String,
    pub agent: String,
}

fn event_name(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::InitStream { .. } => "init_stream",
        StreamEvent::Message { .. } => "message",
        StreamEvent::ToolCall { .. } => "tool_call",
        StreamEvent::ToolResult { .. } => "tool_result",
        StreamEvent::Done { .. } => "done",
        StreamEvent::Error { .. } => "error",
        StreamEvent::EndStream { .. } => "end_stream",
    }
}

fn to_sse(event: StreamEvent) -> Event {
    let name = event_name(&event);
    Event::default().event(name).json_data(&event).unwrap_or_else(|e| {
        tracing::error!("Failed to encode stream event: {}", e);
        Event::default().event("error").data(r#"{"type":"error","message":"encoding failure"}"#)
    })
}

/// `POST /api/chat?agent=` runs one turn and streams it back as SSE.
///
/// The last `user` message in the body is the new turn. Earlier messages are
/// taken from the stored thread, not from the body.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<AgentQuery>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let agent = query.agent()?;

    if body.messages.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".to_string()));
    }
    let message = body
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(ClientMessage::text)
        .ok_or_else(|| ApiError::BadRequest("messages must contain a user message".to_string()))?;

    let mut request = TurnRequest::new(session.user_id, agent, message).with_web_search(body.web_search);
    if let Some(thread_id) = body.thread_id.filter(|id| !id.is_empty()) {
        request = request.in_thread(thread_id);
    }

    let turn = state.pilot.start_turn(request).await?;
    tracing::info!(thread_id = %turn.thread_id, "chat turn started");

    let stream = ReceiverStream::new(turn.events).map(|event| Ok::<Event, Infallible>(to_sse(event)));
    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();

    if let Ok(value) = HeaderValue::from_str(&turn.thread_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(THREAD_ID_HEADER), value);
    }
    Ok(response)
}

/// `GET /api/chat?agent=` creates an empty thread
pub async fn new_thread(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<AgentQuery>,
) -> ApiResult<Json<NewThreadResponse>> {
    let agent = query.agent()?;
    let thread = state.pilot.create_thread(&session.user_id, &agent).await?;
    Ok(Json(NewThreadResponse {
        id: thread.id,
        agent: thread.agent,
    }))
}
