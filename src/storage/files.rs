use chrono::Utc;
use redb::{ReadableTable, WriteTransaction};

use super::db::{index_push, index_remove, read_index, Database, DatabaseError};
use super::links::file_link_ids;
use super::models::FileRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Store a new file record and add it to its owner's index
    pub fn insert_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        debug_assert!(!file.id.is_empty(), "file id must not be empty");
        debug_assert!(!file.owner_id.is_empty(), "file owner must not be empty");

        let write_txn = self.begin_write()?;
        store_file_in(&write_txn, file)?;
        index_push(&write_txn, OWNER_FILES, &file.owner_id, &file.id)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Get a file by its UUID
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id)? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Get all files uploaded by `owner_id`, oldest first
    pub fn list_files_by_owner(&self, owner_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let file_ids = read_index(&read_txn, OWNER_FILES, owner_id)?;
        let files_table = read_txn.open_table(FILES)?;

        let mut files = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            if let Some(data) = files_table.get(file_id.as_str())? {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                files.push(file);
            }
        }

        Ok(files)
    }

    /// Read-modify-write a file inside one write transaction.
    ///
    /// `f` sees the transaction so it can write link rows alongside the file.
    /// If it returns an error the whole transaction is aborted and nothing is
    /// persisted. When the record changed, `version` and `updated_at` are
    /// bumped before commit. Returns `None` if the file does not exist.
    pub fn mutate_file<T, E, F>(&self, id: &str, f: F) -> Result<Option<(FileRecord, T)>, E>
    where
        E: From<DatabaseError>,
        F: FnOnce(&WriteTransaction, &mut FileRecord) -> Result<T, E>,
    {
        let write_txn = self.begin_write()?;

        let existing = load_file_in(&write_txn, id)?;
        let Some(original) = existing else {
            abort(write_txn);
            return Ok(None);
        };

        let mut file = original.clone();
        let output = match f(&write_txn, &mut file) {
            Ok(output) => output,
            Err(e) => {
                abort(write_txn);
                return Err(e);
            }
        };

        if file != original {
            file.version = original.version + 1;
            file.updated_at = Utc::now();
            store_file_in(&write_txn, &file)?;
        }

        write_txn.commit().map_err(DatabaseError::from)?;
        Ok(Some((file, output)))
    }

    /// Delete a file and everything hanging off it: its links, the url
    /// index, the owner index entry and its dispatch record.
    pub fn delete_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let Some(file) = load_file_in(&write_txn, id)? else {
            abort(write_txn);
            return Ok(None);
        };

        let link_ids = {
            let index = write_txn.open_table(FILE_LINKS)?;
            file_link_ids(&index, id)?
        };
        let urls = {
            let mut links_table = write_txn.open_table(LINKS)?;
            let mut urls = Vec::with_capacity(link_ids.len());
            for (_, link_id) in &link_ids {
                if let Some(data) = links_table.remove(link_id.as_str())? {
                    let link: super::models::LinkRecord = rmp_serde::from_slice(data.value())?;
                    urls.push(link.url);
                }
            }
            urls
        };
        {
            let mut url_table = write_txn.open_table(LINK_URLS)?;
            for url in &urls {
                url_table.remove((id, url.as_str()))?;
            }
        }
        {
            let mut index = write_txn.open_table(FILE_LINKS)?;
            for (seq, _) in &link_ids {
                index.remove((id, *seq))?;
            }
        }
        {
            let mut table = write_txn.open_table(DISPATCHES)?;
            table.remove(id)?;
        }
        {
            let mut table = write_txn.open_table(FILES)?;
            table.remove(id)?;
        }
        index_remove(&write_txn, OWNER_FILES, &file.owner_id, id)?;

        write_txn.commit()?;
        Ok(Some(file))
    }
}

fn load_file_in(
    write_txn: &WriteTransaction,
    id: &str,
) -> Result<Option<FileRecord>, DatabaseError> {
    let table = write_txn.open_table(FILES)?;
    let file = match table.get(id)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };
    Ok(file)
}

fn store_file_in(write_txn: &WriteTransaction, file: &FileRecord) -> Result<(), DatabaseError> {
    let data = rmp_serde::to_vec_named(file)?;
    let mut table = write_txn.open_table(FILES)?;
    table.insert(file.id.as_str(), data.as_slice())?;
    Ok(())
}

fn abort(write_txn: WriteTransaction) {
    if let Err(e) = write_txn.abort() {
        tracing::error!(error = %e, "Failed to abort write transaction");
    }
}
