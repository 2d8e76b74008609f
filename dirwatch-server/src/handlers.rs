//! HTTP handlers for the dirwatch control surface.

use std::path::PathBuf;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use dirwatch_core::ResultStore;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::state::AppState;

const DEFAULT_RESULT_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ResultsRequest {
    pub limit: Option<i64>,
    pub start: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskRequest {
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IntervalRequest {
    pub ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MagicWordRequest {
    pub word: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryRequest {
    pub directory: Option<String>,
}

/// Query persisted scan results, newest first.
pub async fn results_handler(
    State(state): State<AppState>,
    body: Option<Json<ResultsRequest>>,
) -> (StatusCode, Json<Value>) {
    let args = body.map(|Json(args)| args).unwrap_or_default();
    let limit = args.limit.unwrap_or(DEFAULT_RESULT_LIMIT);

    match state.store.recent(limit, args.start).await {
        Ok(results) => (
            StatusCode::OK,
            Json(json!({ "result": "ok", "data": results })),
        ),
        Err(err) => {
            warn!("failed to query scan results: {err}");
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "result": "error", "msg": err.to_string() })),
            )
        }
    }
}

/// Start or stop the census worker.
pub async fn task_handler(
    State(state): State<AppState>,
    body: Option<Json<TaskRequest>>,
) -> (StatusCode, Json<Value>) {
    let args = body.map(|Json(args)| args).unwrap_or_default();

    let outcome = match args.action.as_deref() {
        Some("start") => state.supervisor.start().await,
        Some("stop") => state.supervisor.stop().await,
        other => {
            let msg = format!(
                "Expected action start/stop. Received {}",
                other.unwrap_or("nothing")
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "result": "error", "msg": msg })),
            );
        }
    };

    let result = if outcome.is_ignored() { "ignored" } else { "ok" };
    (
        StatusCode::OK,
        Json(json!({ "result": result, "msg": outcome.message() })),
    )
}

/// Change the worker's polling interval (milliseconds).
pub async fn interval_handler(
    State(state): State<AppState>,
    body: Option<Json<IntervalRequest>>,
) -> (StatusCode, Json<Value>) {
    let args = body.map(|Json(args)| args).unwrap_or_default();

    let Some(interval) = args.ms.filter(|ms| *ms > 0) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "result": "error",
                "msg": "Invalid interval provided. Interval should be given in ms"
            })),
        );
    };

    match state.supervisor.change_poll_interval(interval).await {
        Ok(()) => {
            info!("polling interval change to {interval}ms sent to census worker");
            (
                StatusCode::OK,
                Json(json!({
                    "result": "ok",
                    "msg": format!(
                        "Request to change polling interval to {interval}ms sent to census worker"
                    )
                })),
            )
        }
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "result": "error", "msg": err.to_string() })),
        ),
    }
}

/// Change the magic word counted in file contents.
pub async fn magic_word_handler(
    State(state): State<AppState>,
    body: Option<Json<MagicWordRequest>>,
) -> (StatusCode, Json<Value>) {
    let args = body.map(|Json(args)| args).unwrap_or_default();

    let Some(word) = args.word.filter(|word| !word.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "result": "error", "msg": "Invalid/empty magic word" })),
        );
    };

    match state.supervisor.change_magic_word(word.clone()).await {
        Ok(()) => {
            info!("magic word change to {word:?} sent to census worker");
            (
                StatusCode::OK,
                Json(json!({
                    "result": "ok",
                    "msg": format!("Request to change magic word to {word} sent to census worker")
                })),
            )
        }
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "result": "error", "msg": err.to_string() })),
        ),
    }
}

/// Redirect the census to a different directory tree.
pub async fn directory_handler(
    State(state): State<AppState>,
    body: Option<Json<DirectoryRequest>>,
) -> (StatusCode, Json<Value>) {
    let args = body.map(|Json(args)| args).unwrap_or_default();

    let Some(directory) = args.directory.filter(|dir| !dir.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "result": "error",
                "msg": "Invalid/empty directory changes requested"
            })),
        );
    };

    match state
        .supervisor
        .change_directory(PathBuf::from(&directory))
        .await
    {
        Ok(()) => {
            info!("directory change to {directory:?} sent to census worker");
            (
                StatusCode::OK,
                Json(json!({
                    "result": "ok",
                    "msg": format!(
                        "Request to change directory configuration to {directory} sent to census worker"
                    )
                })),
            )
        }
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "result": "error", "msg": err.to_string() })),
        ),
    }
}

/// Report whether the census worker is running.
pub async fn status_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let status = state.supervisor.status().await;
    (
        StatusCode::OK,
        Json(json!({ "result": "ok", "status": status.as_str() })),
    )
}
