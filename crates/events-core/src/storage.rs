use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::{ErrorKind, FieldError, StoreError, ValidationError};
use crate::event::{Event, EventPatch, NewEvent};

/// Field an event listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Date,
    Title,
    Capacity,
    Status,
}

/// Requested ordering for a listing. Parsed from `date`, `-date`, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl FromStr for SortKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match name {
            "date" => SortField::Date,
            "title" => SortField::Title,
            "capacity" => SortField::Capacity,
            "status" => SortField::Status,
            _ => {
                return Err(ValidationError::Fields(vec![FieldError::new(
                    "sort",
                    ErrorKind::InvalidChoice,
                    "sort must be one of: date, title, capacity, status (prefix with '-' for descending)",
                )]))
            }
        };
        Ok(SortKey { field, descending })
    }
}

impl SortKey {
    fn compare(&self, a: &Event, b: &Event) -> Ordering {
        let ordering = match self.field {
            SortField::Date => a.date.cmp(&b.date),
            SortField::Title => a.title.cmp(&b.title),
            SortField::Capacity => a.capacity.cmp(&b.capacity),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        };
        let ordering = if self.descending {
            ordering.reverse()
        } else {
            ordering
        };
        ordering.then_with(|| a.event_id.cmp(&b.event_id))
    }
}

/// Listing criteria: an optional status equality filter (ASCII
/// case-insensitive) and an optional sort key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub status: Option<String>,
    pub sort: Option<SortKey>,
}

impl EventFilter {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            sort: None,
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        match &self.status {
            Some(status) => event.status.as_str().eq_ignore_ascii_case(status),
            None => true,
        }
    }

    /// Filter and order a full scan. Without a sort key events come back in
    /// `event_id` order.
    pub fn apply(&self, events: impl IntoIterator<Item = Event>) -> Vec<Event> {
        let mut events: Vec<Event> = events.into_iter().filter(|e| self.matches(e)).collect();
        match &self.sort {
            Some(sort) => events.sort_by(|a, b| sort.compare(a, b)),
            None => events.sort_by(|a, b| a.event_id.cmp(&b.event_id)),
        }
        events
    }
}

/// Keyed persistence for events.
///
/// Every operation is atomic with respect to a single `event_id`. Concurrent
/// updates to the same id are last-write-wins. Deleted ids are never handed
/// out again.
pub trait EventStore: Send + Sync {
    /// Store a new event. Uses the client-supplied id when present, otherwise
    /// generates one. Fails with `Conflict` if the id is or was in use.
    fn create(&self, new_event: NewEvent) -> Result<Event, StoreError>;

    /// Get an event by id.
    fn get(&self, event_id: &str) -> Result<Event, StoreError>;

    /// List events matching the filter.
    fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError>;

    /// Merge the supplied fields into a stored event.
    fn update(&self, event_id: &str, patch: EventPatch) -> Result<Event, StoreError>;

    /// Delete an event.
    fn delete(&self, event_id: &str) -> Result<(), StoreError>;
}

pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

    use crate::event::generate_event_id;

    #[derive(Default)]
    struct Tables {
        events: HashMap<String, Event>,
        tombstones: HashSet<String>,
    }

    impl Tables {
        fn is_taken(&self, event_id: &str) -> bool {
            self.events.contains_key(event_id) || self.tombstones.contains(event_id)
        }
    }

    /// In-memory event store. Used as the reference implementation and in
    /// tests.
    #[derive(Default)]
    pub struct InMemoryEventStore {
        tables: RwLock<Tables>,
    }

    impl InMemoryEventStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
            self.tables
                .read()
                .map_err(|_| StoreError::Database("event table lock poisoned".to_string()))
        }

        fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
            self.tables
                .write()
                .map_err(|_| StoreError::Database("event table lock poisoned".to_string()))
        }
    }

    impl EventStore for InMemoryEventStore {
        fn create(&self, mut new_event: NewEvent) -> Result<Event, StoreError> {
            let mut tables = self.write()?;

            let event_id = match new_event.event_id.take() {
                Some(id) if tables.is_taken(&id) => return Err(StoreError::Conflict(id)),
                Some(id) => id,
                None => {
                    let mut id = generate_event_id();
                    while tables.is_taken(&id) {
                        id = generate_event_id();
                    }
                    id
                }
            };

            let event = new_event.into_event(event_id.clone());
            tables.events.insert(event_id, event.clone());
            Ok(event)
        }

        fn get(&self, event_id: &str) -> Result<Event, StoreError> {
            self.read()?
                .events
                .get(event_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(event_id.to_string()))
        }

        fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, StoreError> {
            let tables = self.read()?;
            Ok(filter.apply(tables.events.values().cloned()))
        }

        fn update(&self, event_id: &str, patch: EventPatch) -> Result<Event, StoreError> {
            let mut tables = self.write()?;
            let event = tables
                .events
                .get_mut(event_id)
                .ok_or_else(|| StoreError::NotFound(event_id.to_string()))?;
            patch.apply_to(event);
            Ok(event.clone())
        }

        fn delete(&self, event_id: &str) -> Result<(), StoreError> {
            let mut tables = self.write()?;
            if tables.events.remove(event_id).is_none() {
                return Err(StoreError::NotFound(event_id.to_string()));
            }
            tables.tombstones.insert(event_id.to_string());
            Ok(())
        }
    }

}
