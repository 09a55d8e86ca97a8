use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::conversation::{ConversationState, ConversationStateView};
use super::rationale::{rationale_for_state, Rationale};
use super::session::SessionStore;
use super::supervisor::Supervisor;

/// Router builder exposing the conversation endpoints.
///
/// Turns for the same session are serialized here: the chat handler holds a
/// per-session lock across the whole fetch, dispatch, persist sequence, so
/// concurrent posts cannot interleave their read-modify-write and drop a
/// stage transition or decision.
pub fn conversation_router<S>(supervisor: Arc<Supervisor>, store: Arc<S>) -> Router
where
    S: SessionStore + 'static,
{
    let state = ChatState {
        supervisor,
        store,
        turn_locks: Arc::new(Mutex::new(HashMap::new())),
    };
    Router::new()
        .route("/api/v1/loan/chat", post(chat_handler::<S>))
        .route(
            "/api/v1/loan/sessions/:session_id",
            get(session_handler::<S>),
        )
        .with_state(state)
}

pub(crate) struct ChatState<S> {
    supervisor: Arc<Supervisor>,
    store: Arc<S>,
    /// One lock per session id; entries are created on first contact and
    /// kept for the process lifetime.
    turn_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl<S> Clone for ChatState<S> {
    fn clone(&self) -> Self {
        Self {
            supervisor: self.supervisor.clone(),
            store: self.store.clone(),
            turn_locks: self.turn_locks.clone(),
        }
    }
}

impl<S> ChatState<S> {
    fn turn_lock(&self, session_id: &str) -> Option<Arc<Mutex<()>>> {
        let mut registry = self.turn_locks.lock().ok()?;
        Some(
            registry
                .entry(session_id.to_string())
                .or_default()
                .clone(),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub stage: &'static str,
    pub active_agent: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub view: ConversationStateView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<Rationale>,
}

pub(crate) async fn chat_handler<S>(
    State(state): State<ChatState<S>>,
    axum::Json(request): axum::Json<ChatRequest>,
) -> Response
where
    S: SessionStore + 'static,
{
    let lock = match state.turn_lock(&request.session_id) {
        Some(lock) => lock,
        None => return store_failure("session lock registry poisoned".to_string()),
    };
    let guard = match lock.lock() {
        Ok(guard) => guard,
        Err(_) => return store_failure("session turn lock poisoned".to_string()),
    };

    let mut session = match state.store.fetch(&request.session_id) {
        Ok(Some(session)) => session,
        Ok(None) => ConversationState::new(request.session_id.clone()),
        Err(err) => return store_failure(err.to_string()),
    };

    let reply = state.supervisor.handle_turn(&mut session, &request.message);

    if let Err(err) = state.store.upsert(session) {
        return store_failure(err.to_string());
    }
    drop(guard);

    let body = ChatResponse {
        session_id: request.session_id,
        reply: reply.reply,
        stage: reply.stage.label(),
        active_agent: reply.active_agent.label(),
    };
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub(crate) async fn session_handler<S>(
    State(state): State<ChatState<S>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: SessionStore + 'static,
{
    match state.store.fetch(&session_id) {
        Ok(Some(session)) => {
            let rationale = rationale_for_state(&session, state.supervisor.policy());
            let body = SessionResponse {
                view: session.status_view(),
                rationale,
            };
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Ok(None) => {
            let payload = json!({
                "error": "session not found",
                "session_id": session_id,
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => store_failure(err.to_string()),
    }
}

fn store_failure(message: String) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
