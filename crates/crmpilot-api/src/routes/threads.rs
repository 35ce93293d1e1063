use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use crmpilot::persist::{Thread, ThreadSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Session;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct ListThreadsResponse {
    pub threads: Vec<ThreadSummary>,
    pub has_more: bool,
}

/// Caller's threads, newest first
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<ListThreadsQuery>,
) -> ApiResult<Json<ListThreadsResponse>> {
    let limit = query.limit.clamp(1, 100);
    let threads = state
        .pilot
        .stores()
        .threads
        .list_threads(&session.user_id, Some(limit))
        .await?;

    Ok(Json(ListThreadsResponse {
        has_more: threads.len() == limit,
        threads,
    }))
}

pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<Thread>> {
    let thread = state
        .pilot
        .stores()
        .threads
        .get_thread(&thread_id, &session.user_id)
        .await?
        .ok_or(ApiError::ThreadNotFound(thread_id))?;

    Ok(Json(thread))
}

pub async fn delete_thread(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(thread_id): Path<String>,
) -> ApiResult<StatusCode> {
    let deleted = state
        .pilot
        .stores()
        .threads
        .delete_thread(&thread_id, &session.user_id)
        .await?;

    if deleted {
        tracing::info!(thread_id = %thread_id, user_id = %session.user_id, "thread deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::ThreadNotFound(thread_id))
    }
}
