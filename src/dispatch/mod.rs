//! Upload intake and hand-off to the link processor.

mod processor;

pub use processor::{DispatchError, HttpProcessor, LinkProcessor, ProcessRequest};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::blob_store::{blob_key, BlobStore};
use crate::config::UploadConfig;
use crate::lifecycle::LifecycleError;
use crate::storage::models::{DispatchRecord, DispatchState, FileRecord, FileStatus};
use crate::storage::Database;

/// Longest accepted original file name.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// An upload as received from a caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Bytes,
    pub file_name: String,
    pub owner_id: String,
    pub owner_email: String,
}

/// A created file plus what happened when the processor was notified.
#[derive(Debug, Clone)]
pub struct Submission {
    pub file: FileRecord,
    pub dispatch: DispatchRecord,
}

impl Submission {
    pub fn message(&self) -> &'static str {
        if self.dispatch.is_confirmed() {
            "File uploaded and sent for processing"
        } else {
            "File uploaded but could not be sent for processing"
        }
    }

    pub fn warning(&self) -> Option<&str> {
        self.dispatch.warning()
    }
}

pub struct Dispatcher {
    db: Database,
    blob_store: Arc<dyn BlobStore>,
    processor: Arc<dyn LinkProcessor>,
    limits: UploadConfig,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        db: Database,
        blob_store: Arc<dyn BlobStore>,
        processor: Arc<dyn LinkProcessor>,
        limits: UploadConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            blob_store,
            processor,
            limits,
            timeout,
        }
    }

    /// Store an upload, create its PENDING file and ask the processor to
    /// start. Only validation and storage errors fail the call; a dispatch
    /// that is not confirmed is reported on the returned `Submission`.
    pub async fn submit(&self, upload: Upload) -> Result<Submission, LifecycleError> {
        let extension = self.validate(&upload)?;
        let storage_path = blob_key(&upload.owner_id, &extension);
        let mime_type = mime_guess::from_path(&upload.file_name)
            .first_or_text_plain()
            .to_string();
        let byte_size = upload.bytes.len() as u64;

        // Phase 1: bytes to the blob store
        self.blob_store
            .put(&storage_path, upload.bytes)
            .await
            .map_err(|e| {
                error!(owner_id = %upload.owner_id, error = %e, "Failed to store upload");
                LifecycleError::from(e)
            })?;

        // Phase 2: the file row
        let file = FileRecord::new_pending(
            &upload.owner_id,
            &upload.file_name,
            &storage_path,
            &mime_type,
            byte_size,
        );
        if let Err(e) = self.db.insert_file(&file) {
            error!(owner_id = %upload.owner_id, error = %e, "Failed to create file record");
            if let Err(cleanup) = self.blob_store.delete(&storage_path).await {
                warn!(path = %storage_path, error = %cleanup, "Failed to remove orphaned blob");
            }
            return Err(e.into());
        }

        info!(
            file_id = %file.id,
            owner_id = %file.owner_id,
            file_name = %file.file_name,
            byte_size,
            "File uploaded"
        );

        // Phase 3: notify the processor
        let dispatch = self.dispatch(&file, &upload.owner_email).await;
        Ok(Submission { file, dispatch })
    }

    /// Ask the processor again for a file that is still PENDING.
    pub async fn redispatch(
        &self,
        file: &FileRecord,
        owner_email: &str,
    ) -> Result<DispatchRecord, LifecycleError> {
        if file.status != FileStatus::Pending {
            return Err(LifecycleError::InvalidTransition {
                from: file.status,
                to: FileStatus::Processing,
            });
        }
        Ok(self.dispatch(file, owner_email).await)
    }

    /// Run one dispatch attempt as its own task and record the outcome.
    ///
    /// The task owns the request, so the outcome is persisted even if the
    /// caller stops waiting for it.
    async fn dispatch(&self, file: &FileRecord, owner_email: &str) -> DispatchRecord {
        let queued = match self.db.begin_dispatch(&file.id) {
            Ok(record) => record,
            Err(e) => {
                warn!(file_id = %file.id, error = %e, "Failed to record queued dispatch");
                DispatchRecord {
                    file_id: file.id.clone(),
                    state: DispatchState::Queued,
                    attempts: 1,
                    updated_at: Utc::now(),
                }
            }
        };
        let attempts = queued.attempts;

        let db = self.db.clone();
        let processor = Arc::clone(&self.processor);
        let timeout = self.timeout;
        let request = ProcessRequest {
            email: owner_email.to_string(),
            file_id: file.id.clone(),
        };

        let task = tokio::spawn(async move {
            let outcome =
                match tokio::time::timeout(timeout, processor.request_processing(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::Timeout(timeout)),
                };
            let state = match outcome {
                Ok(()) => {
                    info!(file_id = %request.file_id, "Processing request confirmed");
                    DispatchState::Confirmed
                }
                Err(e) => {
                    warn!(file_id = %request.file_id, error = %e, "Processing request not confirmed");
                    DispatchState::Unconfirmed {
                        reason: e.to_string(),
                    }
                }
            };
            let record = DispatchRecord {
                file_id: request.file_id,
                state,
                attempts,
                updated_at: Utc::now(),
            };
            match db.record_dispatch_outcome(&record) {
                Ok(true) => {}
                Ok(false) => debug!(
                    file_id = %record.file_id,
                    attempts,
                    "Dispatch outcome superseded by a later attempt"
                ),
                Err(e) => {
                    warn!(file_id = %record.file_id, error = %e, "Failed to record dispatch outcome")
                }
            }
            record
        });

        match task.await {
            Ok(record) => record,
            Err(e) => {
                error!(file_id = %file.id, error = %e, "Dispatch task failed");
                DispatchRecord {
                    state: DispatchState::Unconfirmed {
                        reason: format!("dispatch task failed: {e}"),
                    },
                    updated_at: Utc::now(),
                    ..queued
                }
            }
        }
    }

    /// Re-check upload shape and size. Returns the normalized extension.
    fn validate(&self, upload: &Upload) -> Result<String, LifecycleError> {
        if upload.bytes.is_empty() {
            return Err(LifecycleError::InvalidInput(
                "No file was sent or the file is empty".to_string(),
            ));
        }

        let name = upload.file_name.trim();
        if name.is_empty() {
            return Err(LifecycleError::InvalidInput(
                "file name must not be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_FILE_NAME_LEN {
            return Err(LifecycleError::InvalidInput(format!(
                "file name exceeds {MAX_FILE_NAME_LEN} characters"
            )));
        }

        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        if !self.limits.allowed_extensions.contains(&extension) {
            return Err(LifecycleError::InvalidInput(format!(
                "Only {} files are allowed",
                self.limits.allowed_extensions.join(", ")
            )));
        }

        if upload.bytes.len() as u64 > self.limits.max_upload_size {
            return Err(LifecycleError::InvalidInput(format!(
                "File exceeds maximum upload size of {} bytes",
                self.limits.max_upload_size
            )));
        }

        Ok(extension)
    }
}
