//! MCP-style tool endpoints for AI agents: the four tools exposed as JSON
//! handlers sharing the task machinery with the REST edge.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use chronicle_common::TaskType;

use crate::routes::{spawn_timeline_task, timeline_events, ApiError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/mcp/create_timeline", post(create_timeline))
        .route("/api/mcp/get_timeline_result", post(get_timeline_result))
        .route("/api/mcp/list_recent_public_timelines", post(list_recent_public_timelines))
        .route("/api/mcp/get_service_status", get(get_service_status))
}

#[derive(Debug, Deserialize)]
struct CreateTimelineRequest {
    topic_text: String,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

async fn create_timeline(
    State(state): State<AppState>,
    Json(request): Json<CreateTimelineRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.topic_text.trim().is_empty() {
        return Err(ApiError::bad_request("topic_text must not be empty"));
    }
    let topic = request.topic_text.trim();

    // Surface reuse to the agent so it can fetch the result immediately.
    if state.config.reuse_composite_viewpoint {
        if let Some(existing) = state
            .store
            .find_reusable_synthetic(topic, chronicle_engine::acquisition::DEFAULT_DATA_SOURCE)
            .await
            .ok()
            .flatten()
        {
            let task = state
                .store
                .create_task(TaskType::SyntheticViewpoint, topic, json!({}), None, false)
                .await?;
            state.store.attach_viewpoint(task.id, existing.id).await?;
            state
                .store
                .set_task_status(
                    task.id,
                    chronicle_common::TaskStatus::Completed,
                    Some("reused existing viewpoint"),
                    Some(0.0),
                )
                .await?;
            return Ok(Json(json!({
                "task_id": task.id,
                "status": "completed",
                "message": "reused existing timeline",
                "reused": true,
            })));
        }
    }

    let task = state
        .store
        .create_task(
            TaskType::SyntheticViewpoint,
            topic,
            request.config.unwrap_or_else(|| json!({})),
            None,
            false,
        )
        .await?;
    spawn_timeline_task(state, task.clone());

    Ok(Json(json!({
        "task_id": task.id,
        "status": task.status.to_string(),
        "message": "timeline generation started",
        "reused": false,
    })))
}

#[derive(Debug, Deserialize)]
struct TimelineResultRequest {
    task_id: Uuid,
}

async fn get_timeline_result(
    State(state): State<AppState>,
    Json(request): Json<TimelineResultRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state
        .store
        .get_task(request.task_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task {}", request.task_id)))?;

    let events = match task.viewpoint_id {
        Some(viewpoint_id) => timeline_events(&state, viewpoint_id).await?,
        None => Vec::new(),
    };

    let sources: std::collections::BTreeSet<String> = events
        .iter()
        .flat_map(|e| {
            e["sources"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|s| s["url"].as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(Json(json!({
        "status": task.status.to_string(),
        "topic": task.topic_text,
        "event_count": events.len(),
        "timeline_events": events,
        "sources_summary": sources,
    })))
}

#[derive(Debug, Deserialize)]
struct ListPublicRequest {
    #[serde(default = "default_list_limit")]
    limit: i64,
}

fn default_list_limit() -> i64 {
    10
}

async fn list_recent_public_timelines(
    State(state): State<AppState>,
    Json(request): Json<ListPublicRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = request.limit.clamp(1, 50);
    let tasks = state.store.list_public_completed(limit, 0).await?;
    Ok(Json(json!({
        "timelines": tasks.iter().map(|t| json!({
            "task_id": t.id,
            "topic": t.topic_text,
            "viewpoint_id": t.viewpoint_id,
            "completed_at": t.updated_at,
        })).collect::<Vec<_>>(),
    })))
}

async fn get_service_status(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // A cheap read proves the database is reachable.
    let database_ok = state.store.list_public_completed(1, 0).await.is_ok();
    Ok(Json(json!({
        "service": "chronicle",
        "database_ok": database_ok,
        "default_llm_provider": state.config.default_llm_provider,
        "reuse_composite_viewpoint": state.config.reuse_composite_viewpoint,
        "reuse_base_viewpoint": state.config.reuse_base_viewpoint,
    })))
}
