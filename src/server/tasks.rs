use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{ApiResult, AppState};
use crate::error::Error;
use crate::kv::{RESEARCH_KEY, TASKS_KEY};
use crate::task::Task;

#[derive(Serialize)]
pub struct TasksResponse {
    success: bool,
    tasks: Vec<Task>,
}

#[derive(Deserialize)]
pub struct SaveTasks {
    tasks: Vec<Task>,
}

#[derive(Serialize)]
pub struct ResearchResponse {
    success: bool,
    items: Vec<Value>,
}

#[derive(Deserialize)]
pub struct SaveResearch {
    items: Vec<Value>,
}

#[derive(Serialize)]
pub struct Saved {
    success: bool,
    saved: usize,
}

pub async fn get_tasks(State(state): State<AppState>) -> ApiResult<TasksResponse> {
    let kv = state.kv()?;
    let tasks = match kv.get(TASKS_KEY).await? {
        Some(blob) => serde_json::from_str(&blob).map_err(Error::from)?,
        None => Vec::new(),
    };
    Ok(Json(TasksResponse {
        success: true,
        tasks,
    }))
}

/// Overwrites the whole collection with the posted one.
pub async fn save_tasks(
    State(state): State<AppState>,
    payload: Result<Json<SaveTasks>, JsonRejection>,
) -> ApiResult<Saved> {
    let kv = state.kv()?;
    let Json(SaveTasks { tasks }) = payload?;
    let blob = serde_json::to_string(&tasks).map_err(Error::from)?;
    kv.put(TASKS_KEY, &blob).await?;
    info!(count = tasks.len(), "saved tasks");
    Ok(Json(Saved {
        success: true,
        saved: tasks.len(),
    }))
}

pub async fn get_research(State(state): State<AppState>) -> ApiResult<ResearchResponse> {
    let kv = state.kv()?;
    let items = match kv.get(RESEARCH_KEY).await? {
        Some(blob) => serde_json::from_str(&blob).map_err(Error::from)?,
        None => Vec::new(),
    };
    Ok(Json(ResearchResponse {
        success: true,
        items,
    }))
}

pub async fn save_research(
    State(state): State<AppState>,
    payload: Result<Json<SaveResearch>, JsonRejection>,
) -> ApiResult<Saved> {
    let kv = state.kv()?;
    let Json(SaveResearch { items }) = payload?;
    let blob = serde_json::to_string(&items).map_err(Error::from)?;
    kv.put(RESEARCH_KEY, &blob).await?;
    info!(count = items.len(), "saved research items");
    Ok(Json(Saved {
        success: true,
        saved: items.len(),
    }))
}
