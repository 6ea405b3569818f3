use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend};
use crate::auth::Caller;
use crate::dispatch::Upload;
use crate::storage::models::{DispatchRecord, DispatchState, FileRecord, FileStatus, LinkRecord};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub byte_size: u64,
    pub file_name: String,
    pub id: String,
    pub mime_type: String,
    pub owner_id: String,
    pub status: FileStatus,
    pub storage_path: String,
    pub total_failed: u64,
    pub total_links: u64,
    pub total_processed: u64,
    pub updated_at: String,
    pub uploaded_at: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_name: String,
    pub id: String,
    pub message: String,
    pub status: FileStatus,
    pub uploaded_at: String,
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub content: Option<String>,
    pub error_description: Option<String>,
    pub file_id: String,
    pub id: String,
    pub page_exists: bool,
    pub post_date: Option<String>,
    pub processed_date: Option<String>,
    pub success: bool,
    pub title: Option<String>,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub attempts: u32,
    pub file_id: String,
    pub reason: Option<String>,
    pub state: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default)]
    pub status: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<JSend<UploadResponse>>), ApiError> {
    let mut upload: Option<(String, bytes::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if upload.is_some() {
            return Err(ApiError::bad_request(
                "Only one file field is accepted per upload",
            ));
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
        upload = Some((file_name, data));
    }

    let (file_name, bytes) = upload.ok_or_else(|| ApiError::bad_request("file field is required"))?;

    let submission = state
        .dispatcher
        .submit(Upload {
            bytes,
            file_name,
            owner_id: caller.user_id.clone(),
            owner_email: caller.email.clone(),
        })
        .await?;

    let response = UploadResponse {
        file_name: submission.file.file_name.clone(),
        id: submission.file.id.clone(),
        message: submission.message().to_string(),
        status: submission.file.status,
        uploaded_at: submission.file.uploaded_at.to_rfc3339(),
        warning: submission.warning().map(str::to_string),
    };

    Ok((StatusCode::CREATED, JSend::success(response)))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSend<Vec<FileResponse>>>, ApiError> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(FileStatus::parse(raw).ok_or_else(|| {
            ApiError::bad_request(format!(
                "status must be one of PENDING, PROCESSING, PROCESSED, FAILED; got '{raw}'"
            ))
        })?),
        None => None,
    };

    let files = state.guard.list_files(&caller)?;
    let items: Vec<FileResponse> = files
        .iter()
        .filter(|f| status.map_or(true, |s| f.status == s))
        .map(file_to_response)
        .collect();

    tracing::debug!(user_id = %caller.user_id, count = items.len(), "Listed files");
    Ok(JSend::success(items))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.guard.authorize(&caller, &id)?;
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    // Phase 1: file row and its links
    let file = state.guard.delete_file(&caller, &id)?;

    // Phase 2: raw upload (best-effort)
    if let Err(e) = state.blob_store.delete(&file.storage_path).await {
        tracing::warn!(file_id = %id, error = %e, "Failed to delete upload from blob store");
    }

    tracing::info!(file_id = %id, user_id = %caller.user_id, "Deleted file");
    Ok(JSend::success(()))
}

pub async fn get_file_links(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<Vec<LinkResponse>>>, ApiError> {
    let links = state.guard.get_file_links(&caller, &id)?;
    tracing::debug!(file_id = %id, count = links.len(), "Listed links");
    Ok(JSend::success(links.iter().map(link_to_response).collect()))
}

pub async fn get_dispatch(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<DispatchResponse>>, ApiError> {
    let record = state
        .guard
        .get_dispatch(&caller, &id)?
        .ok_or_else(|| ApiError::not_found("File has not been dispatched"))?;
    Ok(JSend::success(dispatch_to_response(&record)))
}

pub async fn redispatch(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JSend<DispatchResponse>>, ApiError> {
    let file = state.guard.authorize(&caller, &id)?;
    let record = state.dispatcher.redispatch(&file, &caller.email).await?;
    Ok(JSend::success(dispatch_to_response(&record)))
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        byte_size: file.byte_size,
        file_name: file.file_name.clone(),
        id: file.id.clone(),
        mime_type: file.mime_type.clone(),
        owner_id: file.owner_id.clone(),
        status: file.status,
        storage_path: file.storage_path.clone(),
        total_failed: file.total_failed,
        total_links: file.total_links,
        total_processed: file.total_processed,
        updated_at: file.updated_at.to_rfc3339(),
        uploaded_at: file.uploaded_at.to_rfc3339(),
    }
}

pub(crate) fn link_to_response(link: &LinkRecord) -> LinkResponse {
    LinkResponse {
        content: link.content.clone(),
        error_description: link.error_description.clone(),
        file_id: link.file_id.clone(),
        id: link.id.clone(),
        page_exists: link.page_exists,
        post_date: link.post_date.map(|d| d.to_rfc3339()),
        processed_date: link.processed_date.map(|d| d.to_rfc3339()),
        success: link.success,
        title: link.title.clone(),
        url: link.url.clone(),
    }
}

fn dispatch_to_response(record: &DispatchRecord) -> DispatchResponse {
    let (state, reason) = match record.state {
        DispatchState::Queued => ("queued", None),
        DispatchState::Confirmed => ("confirmed", None),
        DispatchState::Unconfirmed { ref reason } => ("unconfirmed", Some(reason.clone())),
    };
    DispatchResponse {
        attempts: record.attempts,
        file_id: record.file_id.clone(),
        reason,
        state: state.to_string(),
        updated_at: record.updated_at.to_rfc3339(),
    }
}
