//! Events DB - redb implementation of the event store.

pub mod event_store;
pub mod tables;

pub use event_store::RedbEventStore;

use std::path::Path;
use std::sync::Arc;

use redb::Database;

use events_core::StoreError;

/// Open (or create) a database and make sure all tables exist.
pub fn init_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StoreError> {
    let db = Database::create(path).map_err(|e| StoreError::Database(e.to_string()))?;

    RedbEventStore::init_tables(&db)?;

    Ok(Arc::new(db))
}
