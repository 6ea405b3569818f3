mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Blob already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

/// Abstraction over raw upload storage.
/// Blobs are write-once: `put` never overwrites an existing key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError>;
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError>;
}

/// Generate a unique key for an upload: `{owner}/{yyyyMMdd_HHmmss}_{uuid}{ext}`.
///
/// `extension` includes the leading dot. Characters outside `[A-Za-z0-9_-]`
/// in the owner id are replaced so the key always stays one directory deep.
pub fn blob_key(owner_id: &str, extension: &str) -> String {
    let owner: String = owner_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "{owner}/{}_{}{extension}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        uuid::Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_shape() {
        let key = blob_key("42", ".csv");
        let (owner, name) = key.split_once('/').unwrap();
        assert_eq!(owner, "42");
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "20250101_120000_".len() + 32 + ".csv".len());
    }

    #[test]
    fn test_blob_key_sanitizes_owner() {
        let key = blob_key("../evil/owner", ".txt");
        assert!(key.starts_with("___evil_owner/"));
        assert_eq!(key.matches('/').count(), 1);
    }

    #[test]
    fn test_blob_keys_are_unique() {
        assert_ne!(blob_key("1", ".txt"), blob_key("1", ".txt"));
    }
}
