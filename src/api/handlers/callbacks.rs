use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::files::{file_to_response, link_to_response, FileResponse, LinkResponse};
use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::ProcessorCallback;
use crate::storage::models::LinkResult;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

/// A single link result or a batch of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LinkResultsBody {
    One(LinkResult),
    Many(Vec<LinkResult>),
}

impl LinkResultsBody {
    fn into_vec(self) -> Vec<LinkResult> {
        match self {
            LinkResultsBody::One(result) => vec![result],
            LinkResultsBody::Many(results) => results,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LinkCountRequest {
    pub total_links: u64,
}

#[derive(Debug, Serialize)]
pub struct RecordedLinksResponse {
    pub duplicates: usize,
    pub file: FileResponse,
    pub links: Vec<LinkResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn accept_processing(
    State(state): State<Arc<AppState>>,
    _processor: ProcessorCallback,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.engine.accept_processing(&id)?;
    Ok(JSend::success(file_to_response(&file)))
}

pub async fn record_links(
    State(state): State<Arc<AppState>>,
    _processor: ProcessorCallback,
    Path(id): Path<String>,
    AppJson(body): AppJson<LinkResultsBody>,
) -> Result<Json<JSend<RecordedLinksResponse>>, ApiError> {
    let (file, recorded) = state.engine.record_link_results(&id, body.into_vec())?;

    Ok(JSend::success(RecordedLinksResponse {
        duplicates: recorded.iter().filter(|r| r.duplicate).count(),
        file: file_to_response(&file),
        links: recorded.iter().map(|r| link_to_response(&r.link)).collect(),
    }))
}

pub async fn finalize_link_count(
    State(state): State<Arc<AppState>>,
    _processor: ProcessorCallback,
    Path(id): Path<String>,
    AppJson(req): AppJson<LinkCountRequest>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.engine.finalize_link_count(&id, req.total_links)?;
    Ok(JSend::success(file_to_response(&file)))
}
