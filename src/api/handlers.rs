//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChunkRequest, DraftRequest, ErrorResponse, InputResponse, SessionSnapshot,
    SpeechFinishedRequest, SubmitRequest, SuccessResponse,
};
use super::AppState;
use crate::input::{InputError, InputSurface};
use crate::runtime::ManagedSession;
use crate::state_machine::Event;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(end_session))
        // SSE streaming for the render layer
        .route("/api/sessions/:id/stream", get(stream_session))
        // Input surface
        .route("/api/sessions/:id/draft", put(set_draft))
        .route("/api/sessions/:id/submit", post(submit))
        .route("/api/sessions/:id/voice", post(toggle_voice))
        // Browser-side capture and playback
        .route("/api/sessions/:id/voice/chunk", post(voice_chunk))
        .route("/api/sessions/:id/voice/stopped", post(voice_stopped))
        .route("/api/sessions/:id/speech/finished", post(speech_finished))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

fn snapshot(session: &ManagedSession, input: &InputSurface) -> SessionSnapshot {
    let handle = &session.handle;
    let presence = handle.presence();
    SessionSnapshot {
        session_id: handle.session_id().to_string(),
        state: handle.state(),
        presence,
        status: presence.status_label().to_string(),
        controls: input.controls(),
        draft: input.draft().to_string(),
        transcript: handle.transcript().to_vec(),
    }
}

async fn lookup(state: &AppState, id: &str) -> Result<Arc<ManagedSession>, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {id}")))
}

/// Turn an input outcome into the response body. Rejections are reported,
/// not raised.
fn input_response(
    input: &InputSurface,
    outcome: Result<(), InputError>,
) -> Result<Json<InputResponse>, AppError> {
    let reason = match outcome {
        Ok(()) => None,
        Err(InputError::SessionClosed) => {
            return Err(AppError::NotFound(InputError::SessionClosed.to_string()))
        }
        Err(e) => Some(e.to_string()),
    };

    Ok(Json(InputResponse {
        accepted: reason.is_none(),
        reason,
        draft: input.draft().to_string(),
        controls: input.controls(),
    }))
}

fn rejected(input: &InputSurface, reason: impl Into<String>) -> Json<InputResponse> {
    Json(InputResponse {
        accepted: false,
        reason: Some(reason.into()),
        draft: input.draft().to_string(),
        controls: input.controls(),
    })
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.sessions.create().await;
    let input = session.input.lock().await;
    (StatusCode::CREATED, Json(snapshot(&session, &input)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = lookup(&state, &id).await?;
    let input = session.input.lock().await;
    Ok(Json(snapshot(&session, &input)))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !state.sessions.end(&id).await {
        return Err(AppError::NotFound(format!("Session not found: {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = lookup(&state, &id).await?;

    // Subscribe before taking the snapshot so no event falls in between
    let broadcast_rx = session.handle.subscribe();
    let init = {
        let input = session.input.lock().await;
        snapshot(&session, &input)
    };

    Ok(sse_stream(init, broadcast_rx))
}

// ============================================================
// Input Surface
// ============================================================

async fn set_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DraftRequest>,
) -> Result<Json<InputResponse>, AppError> {
    let session = lookup(&state, &id).await?;
    let mut input = session.input.lock().await;
    let outcome = input.set_draft(req.text);
    input_response(&input, outcome)
}

async fn submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Option<Json<SubmitRequest>>,
) -> Result<Json<InputResponse>, AppError> {
    let session = lookup(&state, &id).await?;
    let mut input = session.input.lock().await;

    let outcome = match req.and_then(|Json(req)| req.text) {
        Some(text) => input.submit_text(text).await,
        None => input.submit().await,
    };
    input_response(&input, outcome)
}

async fn toggle_voice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InputResponse>, AppError> {
    let session = lookup(&state, &id).await?;
    let mut input = session.input.lock().await;
    let outcome = input.toggle_voice().await;
    input_response(&input, outcome)
}

// ============================================================
// Browser Capture and Playback
// ============================================================

async fn voice_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChunkRequest>,
) -> Result<Json<InputResponse>, AppError> {
    let session = lookup(&state, &id).await?;
    let accepted = session.capture.push_chunk(&req.text).await;

    let input = session.input.lock().await;
    if accepted {
        input_response(&input, Ok(()))
    } else {
        Ok(rejected(&input, "No capture in progress"))
    }
}

async fn voice_stopped(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InputResponse>, AppError> {
    let session = lookup(&state, &id).await?;
    let accepted = session.capture.client_stopped().await;

    let input = session.input.lock().await;
    if accepted {
        input_response(&input, Ok(()))
    } else {
        Ok(rejected(&input, "No capture in progress"))
    }
}

async fn speech_finished(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SpeechFinishedRequest>,
) -> Result<Json<InputResponse>, AppError> {
    let session = lookup(&state, &id).await?;

    // A finish for any utterance but the one being voiced is a state violation
    let outcome = session
        .handle
        .dispatch(Event::SpeechFinished {
            utterance_id: req.utterance_id,
        })
        .await
        .map_err(|e| AppError::NotFound(e.to_string()))?
        .map_err(InputError::from);

    let input = session.input.lock().await;
    input_response(&input, outcome)
}

async fn get_version() -> &'static str {
    concat!("voice-onboarding ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
