use chrono::Utc;
use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::{DispatchRecord, DispatchState};
use super::tables::*;

impl Database {
    /// Claim the next dispatch attempt for a file and record it as queued.
    /// The read and the increment share one write transaction, so concurrent
    /// callers always get distinct attempt numbers.
    pub fn begin_dispatch(&self, file_id: &str) -> Result<DispatchRecord, DatabaseError> {
        let write_txn = self.begin_write()?;
        let previous = load_dispatch_in(&write_txn, file_id)?;

        let record = DispatchRecord {
            file_id: file_id.to_string(),
            state: DispatchState::Queued,
            attempts: previous.map_or(0, |r| r.attempts) + 1,
            updated_at: Utc::now(),
        };
        store_dispatch_in(&write_txn, &record)?;
        write_txn.commit()?;
        Ok(record)
    }

    /// Store the outcome of an attempt unless a later attempt has already
    /// been recorded. Returns whether the record was written.
    pub fn record_dispatch_outcome(&self, record: &DispatchRecord) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let current = load_dispatch_in(&write_txn, &record.file_id)?;

        if current.is_some_and(|c| c.attempts > record.attempts) {
            write_txn.abort()?;
            return Ok(false);
        }
        store_dispatch_in(&write_txn, record)?;
        write_txn.commit()?;
        Ok(true)
    }

    pub fn get_dispatch(&self, file_id: &str) -> Result<Option<DispatchRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(DISPATCHES)?;

        match table.get(file_id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }
}

fn load_dispatch_in(
    write_txn: &WriteTransaction,
    file_id: &str,
) -> Result<Option<DispatchRecord>, DatabaseError> {
    let table = write_txn.open_table(DISPATCHES)?;
    let record = match table.get(file_id)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };
    Ok(record)
}

fn store_dispatch_in(
    write_txn: &WriteTransaction,
    record: &DispatchRecord,
) -> Result<(), DatabaseError> {
    let data = rmp_serde::to_vec_named(record)?;
    let mut table = write_txn.open_table(DISPATCHES)?;
    table.insert(record.file_id.as_str(), data.as_slice())?;
    Ok(())
}
