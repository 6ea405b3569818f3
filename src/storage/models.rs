use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest URL a link result may carry.
pub const MAX_URL_LEN: usize = 2000;
pub const MAX_TITLE_LEN: usize = 500;
pub const MAX_ERROR_DESCRIPTION_LEN: usize = 1000;

/// Processing status of an uploaded file.
///
/// `Pending -> Processing -> {Processed, Failed}`. The last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move file from {from} to {to}")]
pub struct TransitionError {
    pub from: FileStatus,
    pub to: FileStatus,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Processed | FileStatus::Failed)
    }

    pub fn can_transition_to(self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Pending, FileStatus::Processing)
                | (FileStatus::Processing, FileStatus::Processed)
                | (FileStatus::Processing, FileStatus::Failed)
        )
    }

    /// Checked transition. Self-transitions are not moves and are rejected too.
    pub fn transition(self, next: FileStatus) -> Result<FileStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "PENDING",
            FileStatus::Processing => "PROCESSING",
            FileStatus::Processed => "PROCESSED",
            FileStatus::Failed => "FAILED",
        }
    }

    /// Case-insensitive parse, used by query filters.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "PENDING" => Some(FileStatus::Pending),
            "PROCESSING" => Some(FileStatus::Processing),
            "PROCESSED" => Some(FileStatus::Processed),
            "FAILED" => Some(FileStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded document containing a list of URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub storage_path: String,
    pub mime_type: String,
    pub byte_size: u64,
    /// Zero until the processor reports how many URLs it extracted.
    pub total_links: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub status: FileStatus,
    /// Bumped on every committed mutation.
    pub version: u64,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new_pending(
        owner_id: &str,
        file_name: &str,
        storage_path: &str,
        mime_type: &str,
        byte_size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            file_name: file_name.to_string(),
            storage_path: storage_path.to_string(),
            mime_type: mime_type.to_string(),
            byte_size,
            total_links: 0,
            total_processed: 0,
            total_failed: 0,
            status: FileStatus::Pending,
            version: 0,
            uploaded_at: now,
            updated_at: now,
        }
    }

    /// Number of link results recorded so far.
    pub fn recorded(&self) -> u64 {
        self.total_processed + self.total_failed
    }

    pub fn links_known(&self) -> bool {
        self.total_links > 0
    }

    /// The terminal status this file has earned, if every link has reported.
    pub fn earned_terminal_status(&self) -> Option<FileStatus> {
        if !self.links_known() || self.recorded() != self.total_links {
            return None;
        }
        if self.total_failed < self.total_links {
            Some(FileStatus::Processed)
        } else {
            Some(FileStatus::Failed)
        }
    }
}

/// A link outcome as reported by the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    pub page_exists: bool,
    pub success: bool,
    #[serde(default)]
    pub post_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_date: Option<DateTime<Utc>>,
}

impl LinkResult {
    /// Trim the url so it keys the same link however the processor padded it.
    pub fn normalize(&mut self) {
        let trimmed = self.url.trim();
        if trimmed.len() != self.url.len() {
            self.url = trimmed.to_string();
        }
    }

    /// Re-validate a processor payload before it is applied.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("url must not be empty".to_string());
        }
        if self.url.chars().count() > MAX_URL_LEN {
            return Err(format!("url exceeds {MAX_URL_LEN} characters"));
        }
        if let Some(ref title) = self.title {
            if title.chars().count() > MAX_TITLE_LEN {
                return Err(format!("title exceeds {MAX_TITLE_LEN} characters"));
            }
        }
        let error_description = self
            .error_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if let Some(d) = error_description {
            if d.chars().count() > MAX_ERROR_DESCRIPTION_LEN {
                return Err(format!(
                    "error_description exceeds {MAX_ERROR_DESCRIPTION_LEN} characters"
                ));
            }
        }
        if !self.success && self.page_exists && error_description.is_none() {
            return Err(
                "a failed result needs an error_description or page_exists=false".to_string(),
            );
        }
        Ok(())
    }
}

/// The recorded outcome of processing one URL of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: String,
    pub file_id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    pub page_exists: bool,
    pub success: bool,
    #[serde(default)]
    pub post_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_date: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

impl LinkRecord {
    pub fn from_result(file_id: &str, result: LinkResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_id: file_id.to_string(),
            url: result.url,
            title: result.title,
            content: result.content,
            error_description: result.error_description,
            page_exists: result.page_exists,
            success: result.success,
            post_date: result.post_date,
            processed_date: result.processed_date,
            recorded_at: Utc::now(),
        }
    }

    /// True when `result` carries exactly the payload this link was recorded with.
    pub fn matches(&self, result: &LinkResult) -> bool {
        self.url == result.url
            && self.title == result.title
            && self.content == result.content
            && self.error_description == result.error_description
            && self.page_exists == result.page_exists
            && self.success == result.success
            && self.post_date == result.post_date
            && self.processed_date == result.processed_date
    }
}

/// Whether the link processor acknowledged a processing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DispatchState {
    Queued,
    Confirmed,
    Unconfirmed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub file_id: String,
    pub state: DispatchState,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl DispatchRecord {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, DispatchState::Confirmed)
    }

    /// Failure reason of the last attempt, if it was not confirmed.
    pub fn warning(&self) -> Option<&str> {
        match self.state {
            DispatchState::Unconfirmed { ref reason } => Some(reason.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(url: &str, success: bool) -> LinkResult {
        LinkResult {
            url: url.to_string(),
            title: success.then(|| "Title".to_string()),
            content: None,
            error_description: (!success).then(|| "HTTP 404".to_string()),
            page_exists: success,
            success,
            post_date: None,
            processed_date: None,
        }
    }

    #[test]
    fn test_status_transitions() {
        use FileStatus::*;
        assert_eq!(Pending.transition(Processing), Ok(Processing));
        assert_eq!(Processing.transition(Processed), Ok(Processed));
        assert_eq!(Processing.transition(Failed), Ok(Failed));

        assert!(Pending.transition(Processed).is_err());
        assert!(Processed.transition(Processing).is_err());
        assert!(Failed.transition(Processed).is_err());
        assert!(Processing.transition(Processing).is_err());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&FileStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
        assert_eq!(FileStatus::parse("processed"), Some(FileStatus::Processed));
        assert_eq!(FileStatus::parse("ERROR"), None);
    }

    #[test]
    fn test_earned_terminal_status() {
        let mut file = FileRecord::new_pending("u1", "urls.txt", "u1/x.txt", "text/plain", 10);
        assert_eq!(file.earned_terminal_status(), None);

        file.total_links = 3;
        file.total_processed = 1;
        file.total_failed = 1;
        assert_eq!(file.earned_terminal_status(), None);

        file.total_failed = 2;
        assert_eq!(file.earned_terminal_status(), Some(FileStatus::Processed));

        file.total_processed = 0;
        file.total_failed = 3;
        assert_eq!(file.earned_terminal_status(), Some(FileStatus::Failed));
    }

    #[test]
    fn test_link_result_validation() {
        assert!(result("https://example.com", true).validate().is_ok());
        assert!(result("https://example.com", false).validate().is_ok());
        assert!(result("   ", true).validate().is_err());
        assert!(result(&"a".repeat(MAX_URL_LEN + 1), true).validate().is_err());

        // Reachable page that failed without saying why
        let mut bad = result("https://example.com", false);
        bad.page_exists = true;
        bad.error_description = Some("  ".to_string());
        assert!(bad.validate().is_err());

        // Unreachable page may omit the description
        bad.page_exists = false;
        assert!(bad.validate().is_ok());
    }

    #[test]
    fn test_normalize_trims_url() {
        let mut padded = result("  https://example.com/a\n", true);
        padded.normalize();
        assert_eq!(padded.url, "https://example.com/a");
        assert!(LinkRecord::from_result("file-1", padded.clone())
            .matches(&result("https://example.com/a", true)));
    }

    #[test]
    fn test_link_record_matches_payload() {
        let payload = result("https://example.com/a", true);
        let link = LinkRecord::from_result("file-1", payload.clone());
        assert!(link.matches(&payload));

        let mut changed = payload;
        changed.title = Some("Other".to_string());
        assert!(!link.matches(&changed));
    }
}
