//! link-hub - Upload URL lists and aggregate per-link processing results
//!
//! This crate provides:
//! - Upload intake that stores the raw file and dispatches it to an external
//!   link processor without letting a dispatch failure fail the upload
//! - A file lifecycle state machine (PENDING -> PROCESSING -> PROCESSED/FAILED)
//!   driven by processor callbacks, with idempotent per-url link recording
//! - redb embedded database for files and links (ACID, serialized writers)
//! - Owner-scoped REST API with multipart upload support

pub mod access;
pub mod api;
pub mod auth;
pub mod blob_store;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use access::AccessGuard;
use auth::IdentityProvider;
use blob_store::BlobStore;
use config::Config;
use dispatch::{Dispatcher, LinkProcessor};
use lifecycle::LifecycleEngine;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub blob_store: Arc<dyn BlobStore>,
    pub dispatcher: Dispatcher,
    pub engine: LifecycleEngine,
    pub guard: AccessGuard,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Database,
        blob_store: Arc<dyn BlobStore>,
        processor: Arc<dyn LinkProcessor>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            db.clone(),
            Arc::clone(&blob_store),
            processor,
            config.upload.clone(),
            config.processor.timeout(),
        );
        let engine = LifecycleEngine::new(db.clone(), config.lifecycle.empty_file_policy);
        let guard = AccessGuard::new(db.clone());

        Self {
            config,
            db,
            blob_store,
            dispatcher,
            engine,
            guard,
            identity,
        }
    }
}
