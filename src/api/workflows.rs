/// Workflow REST API endpoints
///
/// Read-only access to the workflow registry plus parameter validation.
/// Unknown workflow names answer with an empty object rather than an error.

use crate::launcher::Launcher;
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator for workflows and instances
    pub launcher: Arc<Launcher>,
}

/// Response for parameter validation
#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub has_errors: bool,
    pub errors: BTreeMap<String, String>,
}

/// Create workflow routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{name}", get(get_workflow))
        .route("/api/workflows/{name}/validate", post(validate_params))
}

/// List all workflows
///
/// GET /api/workflows
/// Returns: { "<name>": { "name", "desc", "path", "schema", "defaults" }, ... }
async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.launcher.get_workflows()))
}

/// Get a specific workflow by name
///
/// GET /api/workflows/{name}
/// Returns: the workflow, or {} when unknown
async fn get_workflow(State(state): State<AppState>, Path(name): Path<String>) -> Json<Value> {
    match state.launcher.get_workflow(&name) {
        Some(workflow) => Json(json!(workflow)),
        None => Json(json!({})),
    }
}

/// Validate parameters against a workflow schema
///
/// POST /api/workflows/{name}/validate
/// Body: { "<param>": <value>, ... }
/// Returns: { "has_errors": bool, "errors": { "<param>": "<message>" } }, or {} when unknown
async fn validate_params(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<Map<String, Value>>,
) -> Json<Value> {
    let Some(workflow) = state.launcher.get_workflow(&name) else {
        return Json(json!({}));
    };

    let (has_errors, errors) = state.launcher.validate(&workflow, &params);
    Json(json!(ValidationResponse { has_errors, errors }))
}
