//! File processing lifecycle.
//!
//! Every mutation runs as one redb write transaction: the file is read,
//! checked, link rows are written and the updated counters committed
//! together. redb admits a single writer, so two callbacks for the same file
//! can never observe the same pre-increment counters, and a failed check
//! leaves no partial writes behind.

use redb::WriteTransaction;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::blob_store::BlobStoreError;
use crate::config::EmptyFilePolicy;
use crate::storage::links::{find_link_in, insert_link_in, tally_links_in};
use crate::storage::models::{FileRecord, FileStatus, LinkRecord, LinkResult, TransitionError};
use crate::storage::{Database, DatabaseError, LinkTally};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage failure: {0}")]
    StorageFailure(String),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Cannot move file from {from} to {to}")]
    InvalidTransition { from: FileStatus, to: FileStatus },
    #[error("A different result is already recorded for {url}")]
    ConflictingResult { url: String },
    #[error("File {file_id} is already {status}")]
    StaleUpdate { file_id: String, status: FileStatus },
    #[error("Link count already finalized at {current}, got {requested}")]
    AlreadyFinalized { current: u64, requested: u64 },
    #[error("Forbidden")]
    Forbidden,
}

impl From<DatabaseError> for LifecycleError {
    fn from(e: DatabaseError) -> Self {
        LifecycleError::StorageFailure(e.to_string())
    }
}

impl From<BlobStoreError> for LifecycleError {
    fn from(e: BlobStoreError) -> Self {
        LifecycleError::StorageFailure(e.to_string())
    }
}

impl From<TransitionError> for LifecycleError {
    fn from(e: TransitionError) -> Self {
        LifecycleError::InvalidTransition {
            from: e.from,
            to: e.to,
        }
    }
}

/// Result of applying one link callback.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedLink {
    pub link: LinkRecord,
    /// The payload was already recorded verbatim; nothing changed.
    pub duplicate: bool,
}

/// A file's stored counters next to what its link rows add up to.
#[derive(Debug, Clone, Serialize)]
pub struct CounterReport {
    pub file_id: String,
    pub total_links: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub counted_processed: u64,
    pub counted_failed: u64,
}

impl CounterReport {
    pub fn is_consistent(&self) -> bool {
        let counts_match = self.total_processed == self.counted_processed
            && self.total_failed == self.counted_failed;
        let within_total =
            self.total_links == 0 || self.total_processed + self.total_failed <= self.total_links;
        counts_match && within_total
    }
}

/// Governs file status transitions and link-result aggregation.
#[derive(Clone)]
pub struct LifecycleEngine {
    db: Database,
    empty_file_policy: EmptyFilePolicy,
}

impl LifecycleEngine {
    pub fn new(db: Database, empty_file_policy: EmptyFilePolicy) -> Self {
        Self {
            db,
            empty_file_policy,
        }
    }

    /// PENDING -> PROCESSING once the processor confirms it started.
    /// Repeating the signal while PROCESSING is a no-op.
    pub fn accept_processing(&self, file_id: &str) -> Result<FileRecord, LifecycleError> {
        let (file, ()) = self
            .db
            .mutate_file(file_id, |_, file| -> Result<(), LifecycleError> {
                match file.status {
                    FileStatus::Pending => {
                        file.status = file.status.transition(FileStatus::Processing)?;
                        Ok(())
                    }
                    FileStatus::Processing => Ok(()),
                    terminal => Err(LifecycleError::InvalidTransition {
                        from: terminal,
                        to: FileStatus::Processing,
                    }),
                }
            })?
            .ok_or_else(|| LifecycleError::NotFound(file_id.to_string()))?;

        info!(file_id = %file_id, status = %file.status, "Processing accepted");
        Ok(file)
    }

    /// Apply one link callback.
    pub fn record_link_result(
        &self,
        file_id: &str,
        result: LinkResult,
    ) -> Result<(FileRecord, RecordedLink), LifecycleError> {
        let (file, mut recorded) = self.record_link_results(file_id, vec![result])?;
        let recorded = recorded
            .pop()
            .ok_or_else(|| LifecycleError::StorageFailure("no link recorded".to_string()))?;
        Ok((file, recorded))
    }

    /// Apply a batch of link callbacks, in order, all-or-nothing.
    pub fn record_link_results(
        &self,
        file_id: &str,
        mut results: Vec<LinkResult>,
    ) -> Result<(FileRecord, Vec<RecordedLink>), LifecycleError> {
        if results.is_empty() {
            return Err(LifecycleError::InvalidInput(
                "at least one link result is required".to_string(),
            ));
        }
        for result in &mut results {
            result.normalize();
            result.validate().map_err(LifecycleError::InvalidInput)?;
        }

        let (file, recorded) = self
            .db
            .mutate_file(file_id, |txn, file| {
                results
                    .into_iter()
                    .map(|result| apply_link_result(txn, file, result))
                    .collect::<Result<Vec<_>, LifecycleError>>()
            })?
            .ok_or_else(|| LifecycleError::NotFound(file_id.to_string()))?;

        let inserted = recorded.iter().filter(|r| !r.duplicate).count();
        if inserted == 0 {
            debug!(file_id = %file_id, "Duplicate link results ignored");
        } else {
            debug!(
                file_id = %file_id,
                inserted,
                processed = file.total_processed,
                failed = file.total_failed,
                "Recorded link results"
            );
        }
        if file.status.is_terminal() && inserted > 0 {
            info!(file_id = %file_id, status = %file.status, "File reached terminal status");
        }

        Ok((file, recorded))
    }

    /// Supply the number of links the processor extracted and re-check
    /// whether the file is complete.
    pub fn finalize_link_count(
        &self,
        file_id: &str,
        total_links: u64,
    ) -> Result<FileRecord, LifecycleError> {
        let policy = self.empty_file_policy;
        let (file, ()) = self
            .db
            .mutate_file(file_id, |txn, file| {
                finalize(txn, file, total_links, policy)
            })?
            .ok_or_else(|| LifecycleError::NotFound(file_id.to_string()))?;

        info!(
            file_id = %file_id,
            total_links,
            status = %file.status,
            "Link count finalized"
        );
        Ok(file)
    }

    /// Compare a file's counters against its recorded link rows.
    pub fn verify_counters(&self, file_id: &str) -> Result<CounterReport, LifecycleError> {
        let file = self
            .db
            .get_file(file_id)?
            .ok_or_else(|| LifecycleError::NotFound(file_id.to_string()))?;
        let tally = self.db.tally_links(file_id)?;

        let report = CounterReport {
            file_id: file.id,
            total_links: file.total_links,
            total_processed: file.total_processed,
            total_failed: file.total_failed,
            counted_processed: tally.processed,
            counted_failed: tally.failed,
        };
        if !report.is_consistent() {
            warn!(file_id = %file_id, ?report, "File counters disagree with link rows");
        }
        Ok(report)
    }
}

fn apply_link_result(
    txn: &WriteTransaction,
    file: &mut FileRecord,
    result: LinkResult,
) -> Result<RecordedLink, LifecycleError> {
    if let Some(existing) = find_link_in(txn, &file.id, &result.url)? {
        if existing.matches(&result) {
            return Ok(RecordedLink {
                link: existing,
                duplicate: true,
            });
        }
        if file.status.is_terminal() {
            return Err(stale(file));
        }
        return Err(LifecycleError::ConflictingResult { url: result.url });
    }

    if file.status.is_terminal() {
        return Err(stale(file));
    }
    if file.status == FileStatus::Pending {
        file.status = file.status.transition(FileStatus::Processing)?;
    }

    let link = LinkRecord::from_result(&file.id, result);
    insert_link_in(txn, &link)?;
    if link.success {
        file.total_processed += 1;
    } else {
        file.total_failed += 1;
    }
    settle(file)?;

    Ok(RecordedLink {
        link,
        duplicate: false,
    })
}

fn finalize(
    txn: &WriteTransaction,
    file: &mut FileRecord,
    total_links: u64,
    policy: EmptyFilePolicy,
) -> Result<(), LifecycleError> {
    if file.links_known() {
        if file.total_links == total_links {
            return Ok(());
        }
        return Err(LifecycleError::AlreadyFinalized {
            current: file.total_links,
            requested: total_links,
        });
    }
    if file.status.is_terminal() {
        // An empty file closed by the policy keeps accepting its own count
        if total_links == 0 {
            return Ok(());
        }
        return Err(stale(file));
    }

    let tally = tally_links_in(txn, &file.id)?;
    repair_counters(file, tally);

    if file.recorded() > total_links {
        return Err(LifecycleError::InvalidInput(format!(
            "{} link results are already recorded, more than the {total_links} reported",
            file.recorded()
        )));
    }

    file.total_links = total_links;
    if file.status == FileStatus::Pending {
        file.status = file.status.transition(FileStatus::Processing)?;
    }

    if total_links == 0 {
        // No product decision exists for files without links; the policy
        // picks between failing them and leaving them open.
        match policy {
            EmptyFilePolicy::Fail => {
                file.status = file.status.transition(FileStatus::Failed)?;
            }
            EmptyFilePolicy::Hold => {}
        }
        return Ok(());
    }

    settle(file)
}

/// Move to PROCESSED/FAILED once every link has reported.
fn settle(file: &mut FileRecord) -> Result<(), LifecycleError> {
    if let Some(terminal) = file.earned_terminal_status() {
        file.status = file.status.transition(terminal)?;
    }
    Ok(())
}

/// Counters are derived data; the link rows win if they ever disagree.
fn repair_counters(file: &mut FileRecord, tally: LinkTally) {
    if file.total_processed != tally.processed || file.total_failed != tally.failed {
        warn!(
            file_id = %file.id,
            stored_processed = file.total_processed,
            stored_failed = file.total_failed,
            counted_processed = tally.processed,
            counted_failed = tally.failed,
            "Repairing file counters from link rows"
        );
        file.total_processed = tally.processed;
        file.total_failed = tally.failed;
    }
}

fn stale(file: &FileRecord) -> LifecycleError {
    LifecycleError::StaleUpdate {
        file_id: file.id.clone(),
        status: file.status,
    }
}
