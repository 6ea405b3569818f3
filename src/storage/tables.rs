use redb::TableDefinition;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Owner index: owner_id -> msgpack Vec of file UUIDs (upload order)
pub const OWNER_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_files");

/// Link records: uuid -> LinkRecord (msgpack)
pub const LINKS: TableDefinition<&str, &[u8]> = TableDefinition::new("links");

/// File index: (file_id, seq) -> link uuid, seq counting up in record order
pub const FILE_LINKS: TableDefinition<(&str, u64), &str> = TableDefinition::new("file_links");

/// Uniqueness index: (file_id, url) -> link uuid
pub const LINK_URLS: TableDefinition<(&str, &str), &str> = TableDefinition::new("link_urls");

/// Dispatch outcomes: file_id -> DispatchRecord (msgpack)
pub const DISPATCHES: TableDefinition<&str, &[u8]> = TableDefinition::new("dispatches");
