/// REST API endpoints for tasks, annotations and task status
/// Every mutating endpoint notifies the push channel
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use protocol::{
    Annotation, AnnotationTimes, Category, LoginRequest, LoginResponse, SignedVideoUrl,
    StatusRequest, StatusUpdate,
};
use serde_json::json;
use store::DbError;
use tracing::{error, info, warn};

use crate::AppState;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    StorageError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("Not found: {}", what)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::StorageError(e) => {
                error!("storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Storage error: {}", e),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => ApiError::NotFound(id),
            other => ApiError::StorageError(other.to_string()),
        }
    }
}

/// POST /api/login - Exchange the shared password for a token
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if req.password != state.config.password {
        warn!("login attempt with wrong password");
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(LoginResponse {
        token: state.tokens.issue(),
    }))
}

/// GET /api/tasks - Task catalog with live statuses
pub async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    let db = state.db.lock();
    Ok(Json(state.catalog.with_statuses(&db)?))
}

/// GET /api/annotations - Every persisted annotation
pub async fn list_annotations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Annotation>>, ApiError> {
    Ok(Json(state.db.lock().list_annotations()?))
}

/// POST /api/annotations - Create one annotation
pub async fn create_annotation(
    State(state): State<AppState>,
    Json(annotation): Json<Annotation>,
) -> Result<(StatusCode, Json<Annotation>), ApiError> {
    check_times(annotation.start_time, annotation.end_time)?;
    {
        let db = state.db.lock();
        if db.get_annotation(&annotation.id.to_string())?.is_some() {
            return Err(ApiError::Conflict(format!(
                "annotation {} already exists",
                annotation.id
            )));
        }
        db.insert_annotation(&annotation)?;
    }
    state.notify();
    Ok((StatusCode::CREATED, Json(annotation)))
}

/// PUT /api/annotations/:id - Move an annotation's start and end
pub async fn update_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(times): Json<AnnotationTimes>,
) -> Result<Json<Annotation>, ApiError> {
    check_times(times.start_time, times.end_time)?;
    let updated = state
        .db
        .lock()
        .update_annotation_times(&id, times.start_time, times.end_time)?;
    state.notify();
    Ok(Json(updated))
}

/// DELETE /api/annotations/:id - Delete one annotation
pub async fn delete_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.db.lock().delete_annotation(&id)?;
    state.notify();
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/annotations/import - Insert a batch of annotations atomically
pub async fn import_annotations(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;
    match value.as_array() {
        Some(items) if !items.is_empty() => {}
        _ => {
            return Err(ApiError::BadRequest(
                "Body must be a non-empty array of annotations".to_string(),
            ))
        }
    }
    let annotations: Vec<Annotation> = serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid annotation: {}", e)))?;
    for a in &annotations {
        check_times(a.start_time, a.end_time)?;
    }

    let imported = state.db.lock().import_annotations(&annotations)?;
    info!("imported {} annotations", imported);
    state.notify();
    Ok((StatusCode::CREATED, Json(json!({ "imported": imported }))))
}

/// DELETE /api/tasks/:task_id/annotations - Delete every annotation of a task
pub async fn delete_task_annotations(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state.db.lock().delete_task_annotations(&task_id)?;
    info!("deleted {} annotations of task {}", removed, task_id);
    state.notify();
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/tasks/:task_id/status - Store a task's status explicitly
pub async fn update_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<StatusUpdate>, ApiError> {
    if state.catalog.find_task(&task_id).is_none() {
        return Err(ApiError::NotFound(task_id));
    }
    state.db.lock().set_task_status(&task_id, req.status)?;
    info!("task {} is now {}", task_id, req.status);
    state.notify();
    Ok(Json(StatusUpdate {
        task_id,
        status: req.status,
    }))
}

/// GET /api/signed-video-url/:task_id - Short-lived URL of a task's video
pub async fn signed_video_url(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<SignedVideoUrl>, ApiError> {
    let task = state
        .catalog
        .find_task(&task_id)
        .ok_or_else(|| ApiError::NotFound(task_id.clone()))?;
    let now = chrono::Utc::now().timestamp();
    let path = state.signer.signed_path(&task.video, now);
    Ok(Json(SignedVideoUrl {
        url: format!("{}{}", state.config.public_base_url(), path),
    }))
}

fn check_times(start_time: f64, end_time: f64) -> Result<(), ApiError> {
    if !start_time.is_finite() || !end_time.is_finite() || start_time < 0.0 || end_time < start_time
    {
        return Err(ApiError::BadRequest(format!(
            "Invalid time range {}..{}",
            start_time, end_time
        )));
    }
    Ok(())
}
