//! HTTP + WebSocket edge. Thin: validation, task spawning, and read
//! endpoints; all pipeline behavior lives in chronicle-engine.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as AxumWsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use chronicle_common::{
    ProgressReporter, SourceArticle, Task, TaskStatus, TaskType,
};
use chronicle_engine::traits::{StoreProgressSink, TimelineStore};

use crate::state::AppState;
use crate::ws::{WsMessage, WsProgressSink};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/from-entity/{entity_id}", post(create_task_from_entity))
        .route("/api/tasks/from-document/{document_id}", post(create_task_from_document))
        .route("/api/tasks/{task_id}", get(get_task))
        .route("/api/tasks/{task_id}/result", get(get_task_result))
        .route("/api/tasks/{task_id}/sharing", patch(update_sharing))
        .route("/api/public/timelines", get(list_public_timelines))
        .route("/api/ws/timeline/from_task/{task_id}", get(ws_timeline))
        .merge(crate::mcp::router())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error plumbing
// ---------------------------------------------------------------------------

pub struct ApiError(StatusCode, String);

impl ApiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, what.into())
    }

    pub fn bad_request(what: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, what.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %err, "internal error");
        Self(StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "detail": self.1 }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Task creation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub topic_text: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task_id: Uuid,
    pub status: String,
    pub viewpoint_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl From<&Task> for TaskResponse {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            status: task.status.to_string(),
            viewpoint_id: task.viewpoint_id,
            notes: task.notes.clone(),
        }
    }
}

async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    if request.topic_text.trim().is_empty() {
        return Err(ApiError::bad_request("topic_text must not be empty"));
    }
    let task = state
        .store
        .create_task(
            TaskType::SyntheticViewpoint,
            request.topic_text.trim(),
            request.config.unwrap_or_else(|| json!({})),
            None,
            request.is_public.unwrap_or(false),
        )
        .await?;

    spawn_timeline_task(state, task.clone());
    Ok((StatusCode::ACCEPTED, Json(TaskResponse::from(&task))))
}

/// Run the task in the background. WebSocket disconnection never cancels
/// this; only the end-to-end timeout does.
pub fn spawn_timeline_task(state: AppState, task: Task) {
    let request_id = Uuid::new_v4().to_string();
    let reporter = ProgressReporter::new(task.id, request_id)
        .with_sink(Arc::new(StoreProgressSink::new(
            Arc::clone(&state.store) as Arc<dyn TimelineStore>
        )))
        .with_sink(Arc::new(WsProgressSink::new(Arc::clone(&state.ws))));

    let timeout = Duration::from_secs(state.config.timeline_generation_timeout_seconds);
    tokio::spawn(async move {
        info!(task_id = %task.id, topic = %task.topic_text, "timeline task started");
        let run = state
            .orchestrator
            .run_timeline_generation_task(&task, reporter.request_id(), &reporter);
        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(task_id = %task.id, error = %e, "timeline task errored"),
            Err(_) => {
                warn!(task_id = %task.id, "timeline task timed out");
                if let Err(e) = state
                    .store
                    .set_task_status(
                        task.id,
                        TaskStatus::Failed,
                        Some("timed out: timeline generation exceeded the limit"),
                        Some(timeout.as_secs_f64()),
                    )
                    .await
                {
                    error!(task_id = %task.id, error = %e, "failed to record task timeout");
                }
            }
        }
    });
}

async fn create_task_from_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<Uuid>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let entity = state
        .store
        .get_entity(entity_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("entity {entity_id}")))?;

    let task = state
        .store
        .create_task(
            TaskType::EntityCanonical,
            &entity.entity_name,
            json!({}),
            None,
            false,
        )
        .await?;

    spawn_anchor_task(state, task.clone(), entity.entity_name, entity.language);
    Ok((StatusCode::ACCEPTED, Json(TaskResponse::from(&task))))
}

async fn create_task_from_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let document = state
        .store
        .get_source_document(document_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("source document {document_id}")))?;

    let task = state
        .store
        .create_task(
            TaskType::DocumentCanonical,
            &document.title,
            json!({}),
            None,
            false,
        )
        .await?;

    spawn_anchor_task(state, task.clone(), document.title, document.language);
    Ok((StatusCode::ACCEPTED, Json(TaskResponse::from(&task))))
}

/// Resolve the anchor title into a fresh article fetch and run only the
/// canonical sub-pipeline.
fn spawn_anchor_task(state: AppState, task: Task, title: String, language: String) {
    let request_id = Uuid::new_v4().to_string();
    let reporter = ProgressReporter::new(task.id, request_id)
        .with_sink(Arc::new(StoreProgressSink::new(
            Arc::clone(&state.store) as Arc<dyn TimelineStore>
        )))
        .with_sink(Arc::new(WsProgressSink::new(Arc::clone(&state.ws))));

    tokio::spawn(async move {
        let page = match state.wiki.get_page(&title, &language).await {
            Ok(page) => page,
            Err(e) => {
                warn!(task_id = %task.id, title, error = %e, "anchor page fetch failed");
                if let Err(status_err) = state
                    .store
                    .set_task_status(
                        task.id,
                        TaskStatus::Failed,
                        Some(&format!("anchor page fetch failed: {e}")),
                        None,
                    )
                    .await
                {
                    error!(task_id = %task.id, error = %status_err, "failed to record fetch failure");
                }
                return;
            }
        };
        let article = SourceArticle {
            source_name: "online_wikipedia".to_string(),
            source_identifier: match page.page_id {
                Some(id) => format!("{}:{id}", page.language),
                None => format!("{}:{}", page.language, page.title),
            },
            title: page.title,
            source_url: page.url,
            language: page.language,
            source_type: "wikipedia".to_string(),
            text_content: page.text,
        };
        if let Err(e) = state
            .orchestrator
            .run_canonical_anchor_task(&task, &article, &reporter)
            .await
        {
            error!(task_id = %task.id, error = %e, "anchor task errored");
        }
    });
}

// ---------------------------------------------------------------------------
// Task reads
// ---------------------------------------------------------------------------

async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task {task_id}")))?;
    let progress = state.store.progress_for_task(task_id).await?;

    Ok(Json(json!({
        "id": task.id,
        "task_type": task.task_type.to_string(),
        "topic_text": task.topic_text,
        "status": task.status.to_string(),
        "is_public": task.is_public,
        "viewpoint_id": task.viewpoint_id,
        "processing_duration_seconds": task.processing_duration_seconds,
        "notes": task.notes,
        "created_at": task.created_at,
        "updated_at": task.updated_at,
        "progress_messages": progress.iter().map(|p| json!({
            "step": p.step_name,
            "message": p.message,
            "data": p.data,
            "timestamp": p.event_timestamp,
            "request_id": p.request_id,
        })).collect::<Vec<_>>(),
    })))
}

async fn get_task_result(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task {task_id}")))?;

    let events = match task.viewpoint_id {
        Some(viewpoint_id) => timeline_events(&state, viewpoint_id).await?,
        None => Vec::new(),
    };

    Ok(Json(json!({
        "id": task.id,
        "topic_text": task.topic_text,
        "status": task.status.to_string(),
        "viewpoint_id": task.viewpoint_id,
        "notes": task.notes,
        "event_count": events.len(),
        "timeline_events": events,
    })))
}

/// Load a viewpoint's events with entities and provenance, sorted by date
/// ascending with undated events first.
pub async fn timeline_events(
    state: &AppState,
    viewpoint_id: Uuid,
) -> anyhow::Result<Vec<serde_json::Value>> {
    let scored = state.store.viewpoint_events_with_scores(viewpoint_id).await?;
    let ids: Vec<Uuid> = scored.iter().map(|(id, _)| *id).collect();
    let contexts = state.store.load_event_contexts(&ids).await?;
    let score_of: std::collections::HashMap<Uuid, Option<f64>> = scored.into_iter().collect();

    let mut events: Vec<(Option<chrono::DateTime<chrono::Utc>>, serde_json::Value)> = contexts
        .into_iter()
        .map(|context| {
            let timestamp = context
                .event
                .date_info
                .as_ref()
                .and_then(|d| d.start_timestamp());
            let value = json!({
                "id": context.event.id,
                "description": context.event.description,
                "date": context.event.event_date_str,
                "date_info": context.event.date_info,
                "timestamp": timestamp,
                "relevance_score": score_of.get(&context.event.id).copied().flatten(),
                "entities": context.entities.iter().map(|e| json!({
                    "name": e.entity_name,
                    "type": e.entity_type,
                })).collect::<Vec<_>>(),
                "sources": context.sources.iter().map(|s| json!({
                    "url": s.source_url,
                    "title": s.source_page_title,
                    "language": s.source_language,
                    "snippet": s.snippet,
                })).collect::<Vec<_>>(),
            });
            (timestamp, value)
        })
        .collect();
    events.sort_by(|(a, _), (b, _)| match (a, b) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y),
    });
    Ok(events.into_iter().map(|(_, value)| value).collect())
}

#[derive(Debug, Deserialize)]
struct SharingRequest {
    is_public: bool,
}

async fn update_sharing(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<SharingRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task {task_id}")))?;
    state.store.set_task_sharing(task.id, request.is_public).await?;
    let task = state
        .store
        .get_task(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task {task_id}")))?;
    Ok(Json(TaskResponse::from(&task)))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    20
}

async fn list_public_timelines(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let limit = page.limit.clamp(1, 100);
    let tasks = state
        .store
        .list_public_completed(limit, page.offset.max(0))
        .await?;
    Ok(Json(tasks.iter().map(TaskResponse::from).collect()))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

async fn ws_timeline(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_ws(state, task_id, socket))
}

async fn handle_ws(state: AppState, task_id: Uuid, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    let task = match state.store.get_task(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            let message = WsMessage::terminal("error", "task not found", "");
            let _ = send_ws(&mut sender, &message).await;
            return;
        }
        Err(e) => {
            error!(%task_id, error = %e, "task lookup failed for websocket");
            return;
        }
    };

    // Historical progress first, so a late-joining client sees everything.
    if let Ok(history) = state.store.progress_for_task(task_id).await {
        for step in history {
            let mut message =
                WsMessage::status(&step.step_name, &step.message, step.data.clone(), &step.request_id);
            message.message_type = "historical_progress".to_string();
            message.is_historical = Some(true);
            if send_ws(&mut sender, &message).await.is_err() {
                return;
            }
        }
    }

    if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
        let message = terminal_message(&task);
        let _ = send_ws(&mut sender, &message).await;
        return;
    }

    let mut live = state.ws.register(task_id);

    // The monitor loop reports terminal states; the task itself never
    // depends on this connection.
    let mut poll = tokio::time::interval(Duration::from_secs(2));
    loop {
        tokio::select! {
            maybe_message = live.recv() => {
                match maybe_message {
                    Some(message) => {
                        if send_ws(&mut sender, &message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = poll.tick() => {
                match state.store.get_task(task_id).await {
                    Ok(Some(task)) if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) => {
                        let message = terminal_message(&task);
                        let _ = send_ws(&mut sender, &message).await;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%task_id, error = %e, "task poll failed");
                    }
                }
            }
            incoming = receiver.next() => {
                // Client went away; the background task keeps running.
                if incoming.is_none() {
                    break;
                }
            }
        }
    }
    state.ws.unregister(task_id);
}

fn terminal_message(task: &Task) -> WsMessage {
    let message_type = if task.status == TaskStatus::Completed {
        "task_completed"
    } else {
        "task_failed"
    };
    WsMessage::terminal(
        message_type,
        task.notes.as_deref().unwrap_or("finished"),
        "",
    )
}

async fn send_ws(
    sender: &mut SplitSink<WebSocket, AxumWsMessage>,
    message: &WsMessage,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(message)?;
    sender.send(AxumWsMessage::Text(text.into())).await?;
    Ok(())
}
