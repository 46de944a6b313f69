/// Instance REST API endpoints
///
/// Launch, inspect and delete instances, read their logs and parameters, and
/// check paths on the host filesystem. Lookups of unknown ids answer with `{}`.

use crate::api::workflows::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Request body for instance creation
#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub workflow: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Optional request body narrowing an instance listing
#[derive(Debug, Default, Deserialize)]
pub struct InstanceFilter {
    #[serde(default)]
    pub instances: Vec<String>,
}

/// Request body for filesystem checks
#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: Option<String>,
}

/// Create instance routes
pub fn create_instance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/instances", get(list_instances).post(create_instance))
        .route("/api/instances/{id}", get(get_instance).delete(delete_instance))
        .route("/api/logs/{id}", get(get_logs))
        .route("/api/params/{id}", get(get_params))
        .route("/api/file", get(file_exists))
        .route("/api/directory", get(directory_exists))
}

/// Parse an optional JSON body; an empty body yields `None`
fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<Option<T>, StatusCode> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body).map(Some).map_err(|e| {
        tracing::warn!("❌ Invalid JSON payload: {}", e);
        StatusCode::BAD_REQUEST
    })
}

fn internal_error(context: &str, e: anyhow::Error) -> StatusCode {
    tracing::error!("{}: {:#}", context, e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// List instances
///
/// GET /api/instances
/// Body (optional): { "instances": ["<id>", ...] }
/// Returns: { "<id>": { "id", "pid", "path", "status", "workflow" }, ... }
async fn list_instances(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Value>, StatusCode> {
    let filter: InstanceFilter = parse_body(&body)?.unwrap_or_default();
    let mut instances = state
        .launcher
        .get_instances()
        .await
        .map_err(|e| internal_error("Failed to list instances", e))?;

    if !filter.instances.is_empty() {
        instances.retain(|id, _| filter.instances.contains(id));
    }

    Ok(Json(json!(instances)))
}

/// Get a specific instance
///
/// GET /api/instances/{id}
async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.launcher.get_instance(&id).await {
        Ok(Some(instance)) => Ok(Json(json!(instance))),
        Ok(None) => Ok(Json(json!({}))),
        Err(e) => Err(internal_error("Failed to get instance", e)),
    }
}

/// Launch a new instance
///
/// POST /api/instances
/// Body: { "workflow": "<name>", "params": { ... } }
/// Returns: { "created": bool, "instance": { ... } }
async fn create_instance(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Value>, StatusCode> {
    let Some(request) = parse_body::<CreateInstanceRequest>(&body)? else {
        return Ok(Json(json!({})));
    };

    let (created, instance) = state
        .launcher
        .launch(&request.workflow, request.params)
        .await
        .map_err(|e| internal_error("Failed to launch instance", e))?;

    Ok(Json(json!({
        "created": created,
        "instance": instance.map(|summary| json!(summary)).unwrap_or_else(|| json!({})),
    })))
}

/// Stop and delete an instance
///
/// DELETE /api/instances/{id}
/// Returns: { "deleted": bool }
async fn delete_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let deleted = state
        .launcher
        .delete_instance(&id)
        .await
        .map_err(|e| internal_error("Failed to delete instance", e))?;

    Ok(Json(json!({ "deleted": deleted })))
}

/// Captured pipeline output
///
/// GET /api/logs/{id}
/// Returns: { "logs": ["<line>", ...] }, or {} when unavailable
async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.launcher.read_logs(&id).await {
        Ok(Some(lines)) => Ok(Json(json!({ "logs": lines }))),
        Ok(None) => Ok(Json(json!({}))),
        Err(e) => Err(internal_error("Failed to read logs", e)),
    }
}

/// Parameters the instance was launched with
///
/// GET /api/params/{id}
/// Returns: { "params": { ... } }, or {} when unavailable
async fn get_params(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.launcher.read_params(&id).await {
        Ok(Some(params)) => Ok(Json(json!({ "params": params }))),
        Ok(None) => Ok(Json(json!({}))),
        Err(e) => Err(internal_error("Failed to read params", e)),
    }
}

/// GET /api/file, body: { "path": "..." } -> { "exists": bool }
async fn file_exists(body: String) -> Result<Json<Value>, StatusCode> {
    path_check(&body, |path| path.is_file())
}

/// GET /api/directory, body: { "path": "..." } -> { "exists": bool }
async fn directory_exists(body: String) -> Result<Json<Value>, StatusCode> {
    path_check(&body, |path| path.is_dir())
}

fn path_check(
    body: &str,
    check: impl Fn(&std::path::Path) -> bool,
) -> Result<Json<Value>, StatusCode> {
    let query: PathQuery = parse_body(body)?.unwrap_or_default();
    match query.path.filter(|path| !path.is_empty()) {
        Some(path) => Ok(Json(json!({ "exists": check(std::path::Path::new(&path)) }))),
        None => Ok(Json(json!({}))),
    }
}
