use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::LinkRecord;
use super::tables::*;

/// Success/failure counts derived from the link rows of one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkTally {
    pub processed: u64,
    pub failed: u64,
}

impl LinkTally {
    fn count(&mut self, link: &LinkRecord) {
        if link.success {
            self.processed += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl Database {
    // ========================================================================
    // Link operations
    // ========================================================================

    /// Get the link recorded for `url` within a file
    pub fn get_link_by_url(
        &self,
        file_id: &str,
        url: &str,
    ) -> Result<Option<LinkRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let url_table = read_txn.open_table(LINK_URLS)?;

        let link_id = match url_table.get((file_id, url))? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let links_table = read_txn.open_table(LINKS)?;
        match links_table.get(link_id.as_str())? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// All links of a file, in the order they were recorded
    pub fn list_links(&self, file_id: &str) -> Result<Vec<LinkRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(FILE_LINKS)?;
        let links_table = read_txn.open_table(LINKS)?;

        let mut links = Vec::new();
        for (_, link_id) in file_link_ids(&index, file_id)? {
            if let Some(data) = links_table.get(link_id.as_str())? {
                let link: LinkRecord = rmp_serde::from_slice(data.value())?;
                links.push(link);
            }
        }
        Ok(links)
    }

    /// Count a file's links by outcome from a committed snapshot
    pub fn tally_links(&self, file_id: &str) -> Result<LinkTally, DatabaseError> {
        let mut tally = LinkTally::default();
        for link in self.list_links(file_id)? {
            tally.count(&link);
        }
        Ok(tally)
    }
}

/// `(seq, link_id)` pairs of one file, in seq order.
pub(crate) fn file_link_ids<T>(
    index: &T,
    file_id: &str,
) -> Result<Vec<(u64, String)>, DatabaseError>
where
    T: ReadableTable<(&'static str, u64), &'static str>,
{
    let mut ids = Vec::new();
    for entry in index.range((file_id, 0u64)..=(file_id, u64::MAX))? {
        let (key, value) = entry?;
        ids.push((key.value().1, value.value().to_string()));
    }
    Ok(ids)
}

// ============================================================================
// Transaction-scoped helpers (used while a file is being mutated)
// ============================================================================

/// Look up the link recorded for `(file_id, url)` inside a write transaction.
pub(crate) fn find_link_in(
    write_txn: &WriteTransaction,
    file_id: &str,
    url: &str,
) -> Result<Option<LinkRecord>, DatabaseError> {
    let link_id = {
        let url_table = write_txn.open_table(LINK_URLS)?;
        let link_id = url_table.get((file_id, url))?.map(|v| v.value().to_string());
        link_id
    };
    let Some(link_id) = link_id else {
        return Ok(None);
    };

    let links_table = write_txn.open_table(LINKS)?;
    let link = match links_table.get(link_id.as_str())? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };
    Ok(link)
}

/// Insert a link row together with its url entry and the next slot in the
/// file's index. The caller has already checked the url is not recorded.
pub(crate) fn insert_link_in(
    write_txn: &WriteTransaction,
    link: &LinkRecord,
) -> Result<(), DatabaseError> {
    debug_assert!(!link.url.is_empty(), "link url must not be empty");

    {
        let data = rmp_serde::to_vec_named(link)?;
        let mut table = write_txn.open_table(LINKS)?;
        table.insert(link.id.as_str(), data.as_slice())?;
    }
    {
        let mut url_table = write_txn.open_table(LINK_URLS)?;
        url_table.insert((link.file_id.as_str(), link.url.as_str()), link.id.as_str())?;
    }

    let file_id = link.file_id.as_str();
    let mut index = write_txn.open_table(FILE_LINKS)?;
    let last_seq = index
        .range((file_id, 0u64)..=(file_id, u64::MAX))?
        .next_back()
        .transpose()?
        .map(|(key, _)| key.value().1);
    let seq = last_seq.map_or(0, |s| s + 1);
    index.insert((file_id, seq), link.id.as_str())?;
    Ok(())
}

/// Count a file's links by outcome, including writes made in this transaction.
pub(crate) fn tally_links_in(
    write_txn: &WriteTransaction,
    file_id: &str,
) -> Result<LinkTally, DatabaseError> {
    let index = write_txn.open_table(FILE_LINKS)?;
    let links_table = write_txn.open_table(LINKS)?;

    let mut tally = LinkTally::default();
    for (_, link_id) in file_link_ids(&index, file_id)? {
        if let Some(data) = links_table.get(link_id.as_str())? {
            let link: LinkRecord = rmp_serde::from_slice(data.value())?;
            tally.count(&link);
        }
    }
    Ok(tally)
}
