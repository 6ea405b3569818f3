use redb::{
    Database as RedbDatabase, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

/// Handle to the relational store. Cheap to clone.
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("link-hub.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        // Initialize application tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(FILES)?;
            let _ = write_txn.open_table(OWNER_FILES)?;
            let _ = write_txn.open_table(LINKS)?;
            let _ = write_txn.open_table(FILE_LINKS)?;
            let _ = write_txn.open_table(LINK_URLS)?;
            let _ = write_txn.open_table(DISPATCHES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction. redb admits a single writer at a time, so
    /// everything done inside one is serialized against every other write.
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }
}

// ============================================================================
// Id-list index helpers
//
// Each entry holds a whole id list and is rewritten on every change. Only used
// for owner lists; per-file link ids live in the `(file_id, seq)` keyed
// FILE_LINKS table.
// ============================================================================

type IndexTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Read the id list stored under `key` from a committed snapshot.
pub(crate) fn read_index(
    read_txn: &ReadTransaction,
    def: IndexTable,
    key: &str,
) -> Result<Vec<String>, DatabaseError> {
    let table = read_txn.open_table(def)?;
    let ids = match table.get(key)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };
    Ok(ids)
}

/// Read the id list stored under `key` inside a write transaction.
fn index_ids(
    write_txn: &WriteTransaction,
    def: IndexTable,
    key: &str,
) -> Result<Vec<String>, DatabaseError> {
    let table = write_txn.open_table(def)?;
    let ids = match table.get(key)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };
    Ok(ids)
}

/// Append `id` to the list under `key` unless it is already there.
pub(crate) fn index_push(
    write_txn: &WriteTransaction,
    def: IndexTable,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut ids = index_ids(write_txn, def, key)?;
    if ids.iter().any(|existing| existing == id) {
        return Ok(());
    }
    ids.push(id.to_string());

    let data = rmp_serde::to_vec_named(&ids)?;
    let mut table = write_txn.open_table(def)?;
    table.insert(key, data.as_slice())?;
    Ok(())
}

/// Remove `id` from the list under `key`, dropping the entry once it is empty.
pub(crate) fn index_remove(
    write_txn: &WriteTransaction,
    def: IndexTable,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut ids = index_ids(write_txn, def, key)?;
    ids.retain(|existing| existing != id);

    let mut table = write_txn.open_table(def)?;
    if ids.is_empty() {
        table.remove(key)?;
    } else {
        let data = rmp_serde::to_vec_named(&ids)?;
        table.insert(key, data.as_slice())?;
    }
    Ok(())
}
