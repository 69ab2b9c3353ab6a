use redb::TableDefinition;

/// Table for storing events.
/// Key: eventId (the partition key)
/// Value: serialized Event as JSON bytes
pub const EVENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("events");

/// Table for ids of deleted events, so they are never handed out again.
/// Key: eventId
/// Value: deletion time in milliseconds since the Unix epoch
pub const TOMBSTONES_TABLE: TableDefinition<&str, u64> = TableDefinition::new("tombstones");
