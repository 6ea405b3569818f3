use tracing::warn;

use crate::auth::Caller;
use crate::lifecycle::LifecycleError;
use crate::storage::models::{DispatchRecord, FileRecord, LinkRecord};
use crate::storage::Database;

/// Scopes reads and mutations to the file's owner.
///
/// A file that does not exist and a file owned by someone else are both
/// reported as `Forbidden`, so callers cannot probe for other users' ids.
#[derive(Clone)]
pub struct AccessGuard {
    db: Database,
}

impl AccessGuard {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn authorize(&self, caller: &Caller, file_id: &str) -> Result<FileRecord, LifecycleError> {
        match self.db.get_file(file_id)? {
            Some(file) if file.owner_id == caller.user_id => Ok(file),
            _ => {
                warn!(
                    user_id = %caller.user_id,
                    file_id = %file_id,
                    "Access to file denied"
                );
                Err(LifecycleError::Forbidden)
            }
        }
    }

    pub fn list_files(&self, caller: &Caller) -> Result<Vec<FileRecord>, LifecycleError> {
        Ok(self.db.list_files_by_owner(&caller.user_id)?)
    }

    pub fn get_file_links(
        &self,
        caller: &Caller,
        file_id: &str,
    ) -> Result<Vec<LinkRecord>, LifecycleError> {
        let file = self.authorize(caller, file_id)?;
        Ok(self.db.list_links(&file.id)?)
    }

    pub fn get_dispatch(
        &self,
        caller: &Caller,
        file_id: &str,
    ) -> Result<Option<DispatchRecord>, LifecycleError> {
        let file = self.authorize(caller, file_id)?;
        Ok(self.db.get_dispatch(&file.id)?)
    }

    /// Delete an owned file and its links. Returns the removed record so the
    /// caller can clean up the blob.
    pub fn delete_file(&self, caller: &Caller, file_id: &str) -> Result<FileRecord, LifecycleError> {
        self.authorize(caller, file_id)?;
        self.db
            .delete_file(file_id)?
            .ok_or(LifecycleError::Forbidden)
    }
}
