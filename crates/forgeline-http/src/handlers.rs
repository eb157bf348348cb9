use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use forgeline_core::{RunOptions, RunState, Specification};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{not_found, ApiError};
use crate::templates;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub specification: Specification,
    #[serde(flatten)]
    pub options: RunOptions,
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    let run_id = state
        .orchestrator
        .submit(req.specification, req.options)
        .await?;
    Ok(Json(json!({ "run_id": run_id })))
}

pub async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<RunState>> {
    Json(state.orchestrator.list_runs())
}

pub async fn get_run(State(state): State<Arc<AppState>>, Path(run_id): Path<String>) -> Response {
    match state.orchestrator.run_state(&run_id) {
        Some(run_state) => Json(run_state).into_response(),
        None => not_found(format!("no such run '{run_id}'")),
    }
}

pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Response {
    match state.orchestrator.run_state(&run_id) {
        Some(_) => {
            state.orchestrator.cancel(&run_id);
            Json(json!({ "cancelled": run_id })).into_response()
        }
        None => not_found(format!("no such run '{run_id}'")),
    }
}

pub async fn run_logs(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Json<Value> {
    let output_dir = state.orchestrator.store().output_dir_for(&run_id);

    let build_logs = read_category_entries(&output_dir.join("build_log")).await;
    let quality_reports = read_category_entries(&output_dir.join("reports")).await;

    Json(json!({
        "run_id": run_id,
        "output_dir": output_dir.display().to_string(),
        "build_logs": build_logs,
        "quality_reports": quality_reports,
    }))
}

/// Read every non-sidecar file in `dir`, newest modification time first.
async fn read_category_entries(dir: &FsPath) -> Vec<Value> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut out = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if name.ends_with(".meta.json") {
            continue;
        }
        let Ok(meta) = entry.metadata().await else { continue };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read log entry");
                continue;
            }
        };
        let parsed = serde_json::from_str::<Value>(&content).unwrap_or(Value::String(content));
        out.push((modified, json!({ "filename": name, "content": parsed })));
    }

    out.sort_by(|a, b| b.0.cmp(&a.0));
    out.into_iter().map(|(_, value)| value).collect()
}

pub async fn list_artifacts(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut all = Vec::new();
    for run in state.orchestrator.list_runs() {
        match state.orchestrator.store().list_artifacts(&run.run_id).await {
            Ok(listing) => all.extend(listing),
            Err(err) => warn!(run_id = %run.run_id, error = %err, "failed to list artifacts"),
        }
    }
    Json(json!(all))
}

pub async fn read_output(
    State(state): State<Arc<AppState>>,
    Path((run_id, relative)): Path<(String, String)>,
) -> Response {
    if relative.split('/').any(|segment| segment == "..") {
        return not_found("path must not contain '..'");
    }

    let root = state.orchestrator.store().output_dir_for(&run_id);
    let full = root.join(&relative);

    let bytes = match tokio::fs::read(&full).await {
        Ok(bytes) => bytes,
        Err(_) => return not_found(format!("no such artifact '{relative}' under run '{run_id}'")),
    };

    match infer_kind(&full) {
        ArtifactKind::Text => match String::from_utf8(bytes) {
            Ok(content) => Json(json!({ "content": content })).into_response(),
            Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
        },
        ArtifactKind::Binary(content_type) => {
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
    }
}

enum ArtifactKind {
    Text,
    Binary(&'static str),
}

fn infer_kind(path: &FsPath) -> ArtifactKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md" | "txt" | "h" | "c" | "json") => ArtifactKind::Text,
        Some("png") => ArtifactKind::Binary("image/png"),
        Some("pdf") => ArtifactKind::Binary("application/pdf"),
        _ => ArtifactKind::Binary("application/octet-stream"),
    }
}

pub async fn list_templates() -> Json<Value> {
    Json(templates::example_specifications())
}

pub async fn docs_rag(State(state): State<Arc<AppState>>) -> Json<Value> {
    let docs: Vec<Value> = state
        .orchestrator
        .retrieval()
        .documents()
        .map(|doc| {
            json!({
                "title": doc.id,
                "content": doc.text,
                "category": doc.domain,
            })
        })
        .collect();
    Json(json!(docs))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
