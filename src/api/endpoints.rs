//! API endpoint handlers
//!
//! This module implements the HTTP endpoints behind the browser UI:
//! session management, screenshot upload, the "Code UI" flow, chat
//! refinement, preview, download and health checks.

use crate::api::error::ApiError;
use crate::api::page::render_index;
use crate::core::config::Config;
use crate::core::constants::{history, mime, role};
use crate::core::pipeline::{PipelineEvent, Prompts, preview_document, refine_with_request, run_code_ui};
use crate::core::provider::Provider;
use crate::core::screenshot::ImageInput;
use crate::core::session::{ChatEntry, SessionStore, UiSession};
use crate::core::chat::ChatSession;
use crate::models::gemini::{Content, GenerateContentRequest, GenerationConfig, Part};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    response::{
        Html, IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Room for the multipart framing around the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: Arc<dyn Provider>,
    pub sessions: Arc<SessionStore>,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(index))
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/api/sessions/{id}/image",
            post(upload_image).get(get_image),
        )
        .route("/api/sessions/{id}/code-ui", post(code_ui))
        .route("/api/sessions/{id}/chat", post(chat))
        .route("/api/sessions/{id}/cancel", post(cancel))
        .route("/api/sessions/{id}/preview", get(preview))
        .route("/api/sessions/{id}/download", get(download))
        .route("/health", get(health_check))
        .route("/test-connection", get(test_connection))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn find_session(state: &AppState, id: &Uuid) -> Result<Arc<Mutex<UiSession>>, ApiError> {
    state.sessions.get(id).await.ok_or(ApiError::SessionNotFound)
}

fn session_json(session: &UiSession) -> serde_json::Value {
    json!({
        "id": session.id,
        "has_image": session.image.is_some(),
        "image": session.image.as_ref().map(|image| json!({
            "width": image.width,
            "height": image.height,
            "file_name": image.file_name,
        })),
        "refined_html": session.refined_html,
        "chat_history": session.chat_history,
        "busy": session.is_busy(),
        "model_turns": session.chat.as_ref().map(|chat| chat.history().len()),
        "last_access": session.last_access.to_rfc3339(),
    })
}

/// GET / - Browser UI
async fn index(State(state): State<AppState>) -> impl IntoResponse {
    Html(render_index(&state.config))
}

/// POST /api/sessions - Start a new UI session
async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let chat = ChatSession::from_config(state.provider.clone(), &state.config);
    let id = state.sessions.create(chat).await;
    (StatusCode::CREATED, Json(json!({ "id": id })))
}

/// GET /api/sessions/{id} - Current session state
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let handle = find_session(&state, &id).await?;
    let session = handle.lock().await;
    Ok(Json(session_json(&session)))
}

/// DELETE /api/sessions/{id} - Drop a session
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id).await {
        state.provider.cancel_request(&id.to_string()).await;
        info!("Deleted session {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound)
    }
}

/// POST /api/sessions/{id}/image - Upload a screenshot (multipart field `file`)
async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let handle = find_session(&state, &id).await?;

    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::Upload {
        status: e.status(),
        message: e.body_text(),
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| ApiError::Upload {
            status: e.status(),
            message: e.body_text(),
        })?;

        debug!(
            "Received upload {:?} ({:?}, {} bytes)",
            file_name,
            content_type,
            bytes.len()
        );

        image = Some(ImageInput::from_upload(
            &bytes,
            content_type.as_deref(),
            file_name.as_deref(),
            state.config.max_upload_bytes,
        )?);
        break;
    }

    let image =
        image.ok_or_else(|| ApiError::BadRequest("Missing multipart field `file`".to_string()))?;

    let mut session = handle.lock().await;
    if session.is_busy() {
        return Err(ApiError::Busy);
    }

    let response = json!({
        "width": image.width,
        "height": image.height,
        "mime_type": image.mime_type(),
        "file_name": image.file_name,
    });
    info!(
        "Session {} uploaded a {}x{} screenshot",
        id, image.width, image.height
    );
    session.set_image(image);

    Ok(Json(response))
}

/// GET /api/sessions/{id}/image - The normalized screenshot
async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let handle = find_session(&state, &id).await?;
    let session = handle.lock().await;
    let image = session.image.as_ref().ok_or(ApiError::NoImage)?;

    Ok(([(header::CONTENT_TYPE, mime::JPEG)], image.data.clone()).into_response())
}

fn pipeline_event(event: &PipelineEvent) -> Event {
    match event {
        PipelineEvent::StageStarted { stage, label } => Event::default()
            .event("stage_started")
            .data(json!({ "stage": stage, "label": label }).to_string()),
        PipelineEvent::StageFinished { stage, text } => Event::default()
            .event("stage_finished")
            .data(json!({ "stage": stage, "text": text }).to_string()),
    }
}

/// POST /api/sessions/{id}/code-ui - Generate HTML from the screenshot
///
/// Streams progress as server-sent events: `stage_started`,
/// `stage_finished`, then `done` or `error`.
async fn code_ui(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let handle = find_session(&state, &id).await?;

    let (mut chat, image, request_id) = {
        let mut session = handle.lock().await;
        let image = session.image.clone().ok_or(ApiError::NoImage)?;
        let chat = session.begin_call().ok_or(ApiError::Busy)?;
        (chat, image, session.request_id())
    };

    info!("Session {} started Code UI with {}", id, chat.model());

    let prompts = Prompts::new(state.config.css_framework.clone());
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    tokio::spawn(async move {
        let result = run_code_ui(&mut chat, &prompts, &image, Some(request_id), |event| {
            let _ = tx.send(pipeline_event(&event));
        })
        .await;

        let mut session = handle.lock().await;
        session.end_call(chat);

        let final_event = match result {
            Ok(output) => {
                session.refined_html = output.html.clone();
                session
                    .chat_history
                    .push(ChatEntry::new(history::INITIAL_HTML, output.html.clone()));
                info!("Session {} finished Code UI", id);
                Event::default()
                    .event("done")
                    .data(json!({ "html": output.html }).to_string())
            }
            Err(e) => {
                error!("Code UI failed for session {}: {}", id, e);
                Event::default()
                    .event("error")
                    .data(json!({ "message": e.to_string() }).to_string())
            }
        };
        // The client may have gone away; the session is updated either way
        let _ = tx.send(final_event);
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<_, Infallible>(event);
        }
    };

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

/// POST /api/sessions/{id}/chat - Ask for a change to the current HTML
async fn chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let handle = find_session(&state, &id).await?;

    let (mut chat, current_html, request_id) = {
        let mut session = handle.lock().await;
        if session.image.is_none() {
            return Err(ApiError::NoImage);
        }
        let chat = session.begin_call().ok_or(ApiError::Busy)?;
        session
            .chat_history
            .push(ChatEntry::new(history::USER, message.clone()));
        (chat, session.refined_html.clone(), session.request_id())
    };

    let prompts = Prompts::new(state.config.css_framework.clone());
    let guard = CancelOnDrop::new(state.provider.clone(), request_id.clone());

    // The call runs in its own task so the session is restored even when the
    // client disconnects and this handler is dropped
    let task = tokio::spawn(async move {
        let result = refine_with_request(
            &mut chat,
            &prompts,
            &current_html,
            &message,
            Some(request_id),
        )
        .await;

        let mut session = handle.lock().await;
        session.end_call(chat);

        match result {
            Ok(html) => {
                session.refined_html = html.clone();
                session
                    .chat_history
                    .push(ChatEntry::new(history::ASSISTANT, html.clone()));
                Ok(json!({
                    "html": html,
                    "chat_history": session.chat_history,
                }))
            }
            Err(e) => {
                session.chat_history.pop();
                Err(ApiError::from(e))
            }
        }
    });

    let result = task.await;
    guard.disarm();

    match result {
        Ok(response) => response.map(Json),
        Err(e) => {
            error!("Chat task for session {} failed: {}", id, e);
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

/// Cancels a session's model call if the handler awaiting it is dropped
struct CancelOnDrop {
    provider: Arc<dyn Provider>,
    request_id: Option<String>,
}

impl CancelOnDrop {
    fn new(provider: Arc<dyn Provider>, request_id: String) -> Self {
        Self {
            provider,
            request_id: Some(request_id),
        }
    }

    fn disarm(mut self) {
        self.request_id = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(request_id) = self.request_id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        info!("Client went away; cancelling model call {}", request_id);
        let provider = self.provider.clone();
        runtime.spawn(async move {
            provider.cancel_request(&request_id).await;
        });
    }
}

/// POST /api/sessions/{id}/cancel - Abort the in-flight model call
async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    find_session(&state, &id).await?;
    let cancelled = state.provider.cancel_request(&id.to_string()).await;
    if cancelled {
        info!("Cancelled model call for session {}", id);
    }
    Ok(Json(json!({ "cancelled": cancelled })))
}

/// GET /api/sessions/{id}/preview - Live preview of the current HTML
async fn preview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, ApiError> {
    let handle = find_session(&state, &id).await?;
    let session = handle.lock().await;
    if session.refined_html.is_empty() {
        return Err(ApiError::NoHtml);
    }
    Ok(Html(preview_document(&session.refined_html)))
}

/// GET /api/sessions/{id}/download - Current HTML as `index.html`
async fn download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let handle = find_session(&state, &id).await?;
    let session = handle.lock().await;
    if session.refined_html.is_empty() {
        return Err(ApiError::NoHtml);
    }

    Ok((
        [
            (header::CONTENT_TYPE, mime::HTML),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"index.html\""),
        ],
        session.refined_html.clone(),
    )
        .into_response())
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "provider": state.provider.provider_name(),
        "model": state.config.model,
        "css_framework": state.config.css_framework,
        "api_key_configured": state.config.validate_api_key(),
        "sessions": state.sessions.len().await,
    }))
}

/// GET /test-connection - Test Gemini API connectivity
async fn test_connection(State(state): State<AppState>) -> impl IntoResponse {
    let test_request = GenerateContentRequest {
        contents: vec![Content {
            role: Some(role::USER.to_string()),
            parts: vec![Part::text("Hello")],
        }],
        generation_config: Some(GenerationConfig {
            max_output_tokens: Some(5),
            ..state.config.generation_config()
        }),
        safety_settings: state.config.safety_settings(),
    };

    match state
        .provider
        .generate_content(&state.config.model, &test_request, None)
        .await
    {
        Ok(_) => Json(json!({
            "status": "success",
            "message": format!("Successfully connected to {}", state.provider.provider_name()),
            "provider": state.provider.provider_name(),
            "model_used": state.config.model,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
        Err(e) => {
            error!("API connectivity test failed: {}", e);
            Json(json!({
                "status": "failed",
                "error_type": "API Error",
                "message": e.to_string(),
                "provider": state.provider.provider_name(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "suggestions": [
                    "Check your GEMINI_API_KEY is valid",
                    "Check that GEMINI_MODEL is available to your key",
                    "Check if you have reached rate limits",
                ],
            }))
        }
    }
}
