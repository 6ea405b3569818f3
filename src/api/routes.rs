use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Room for multipart boundaries and headers on top of the file itself, so
/// oversized files reach validation and get a proper message.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.upload.max_upload_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        // Files
        .route(
            "/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files", get(handlers::list_files))
        .route(
            "/files/:id",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/files/:id/links", get(handlers::get_file_links))
        .route(
            "/files/:id/dispatch",
            get(handlers::get_dispatch).post(handlers::redispatch),
        )
        // Processor callbacks
        .route(
            "/_internal/files/:id/processing",
            post(handlers::accept_processing),
        )
        .route("/_internal/files/:id/links", post(handlers::record_links))
        .route(
            "/_internal/files/:id/link-count",
            put(handlers::finalize_link_count),
        )
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
