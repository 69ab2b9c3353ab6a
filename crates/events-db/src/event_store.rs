use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableTable};

use events_core::{
    generate_event_id, Event, EventFilter, EventPatch, EventStore, NewEvent, StoreError,
};

use crate::tables::{EVENTS_TABLE, TOMBSTONES_TABLE};

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

fn encode(event: &Event) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(event).map_err(db_err)
}

fn decode(bytes: &[u8]) -> Result<Event, StoreError> {
    serde_json::from_slice(bytes).map_err(db_err)
}

fn current_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// redb implementation of EventStore.
///
/// Each operation runs inside one redb transaction; redb serializes write
/// transactions, so concurrent updates to one id are last-write-wins.
pub struct RedbEventStore {
    db: Arc<Database>,
}

impl RedbEventStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StoreError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            let _ = write_txn.open_table(EVENTS_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(TOMBSTONES_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}

impl EventStore for RedbEventStore {
    fn create(&self, mut new_event: NewEvent) -> Result<Event, StoreError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;

        let created = {
            let mut events = write_txn.open_table(EVENTS_TABLE).map_err(db_err)?;
            let tombstones = write_txn.open_table(TOMBSTONES_TABLE).map_err(db_err)?;

            let is_taken = |id: &str| -> Result<bool, StoreError> {
                Ok(events.get(id).map_err(db_err)?.is_some()
                    || tombstones.get(id).map_err(db_err)?.is_some())
            };

            let event_id = match new_event.event_id.take() {
                Some(id) => {
                    if is_taken(&id)? {
                        Err(id)
                    } else {
                        Ok(id)
                    }
                }
                None => {
                    let mut id = generate_event_id();
                    while is_taken(&id)? {
                        id = generate_event_id();
                    }
                    Ok(id)
                }
            };

            match event_id {
                Ok(event_id) => {
                    let event = new_event.into_event(event_id);
                    let value = encode(&event)?;
                    events
                        .insert(event.event_id.as_str(), value.as_slice())
                        .map_err(db_err)?;
                    Ok(event)
                }
                Err(taken) => Err(taken),
            }
        };

        match created {
            Ok(event) => {
                write_txn.commit().map_err(db_err)?;
                Ok(event)
            }
            Err(taken) => {
                write_txn.abort().map_err(db_err)?;
                Err(StoreError::Conflict(taken))
            }
        }
    }

    fn get(&self, event_id: &str) -> Result<Event, StoreError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let events = read_txn.open_table(EVENTS_TABLE).map_err(db_err)?;

        let event = match events.get(event_id).map_err(db_err)? {
            Some(value) => decode(value.value())?,
            None => return Err(StoreError::NotFound(event_id.to_string())),
        };
        Ok(event)
    }

    fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(EVENTS_TABLE).map_err(db_err)?;

        let mut events = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            events.push(decode(value.value())?);
        }

        Ok(filter.apply(events))
    }

    fn update(&self, event_id: &str, patch: EventPatch) -> Result<Event, StoreError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;

        let updated = {
            let mut events = write_txn.open_table(EVENTS_TABLE).map_err(db_err)?;
            let current = events
                .get(event_id)
                .map_err(db_err)?
                .map(|value| decode(value.value()))
                .transpose()?;

            match current {
                Some(mut event) => {
                    patch.apply_to(&mut event);
                    let value = encode(&event)?;
                    events
                        .insert(event_id, value.as_slice())
                        .map_err(db_err)?;
                    Some(event)
                }
                None => None,
            }
        };

        match updated {
            Some(event) => {
                write_txn.commit().map_err(db_err)?;
                Ok(event)
            }
            None => {
                write_txn.abort().map_err(db_err)?;
                Err(StoreError::NotFound(event_id.to_string()))
            }
        }
    }

    fn delete(&self, event_id: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;

        let removed = {
            let mut events = write_txn.open_table(EVENTS_TABLE).map_err(db_err)?;
            let removed = events.remove(event_id).map_err(db_err)?.is_some();
            if removed {
                let mut tombstones = write_txn.open_table(TOMBSTONES_TABLE).map_err(db_err)?;
                tombstones
                    .insert(event_id, current_epoch_ms())
                    .map_err(db_err)?;
            }
            removed
        };

        if !removed {
            write_txn.abort().map_err(db_err)?;
            return Err(StoreError::NotFound(event_id.to_string()));
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}
