//! Events Core - Domain model, validation, and storage traits.
//!
//! This crate contains the core domain logic for the Events API. It knows
//! nothing about HTTP; the server crate translates its typed failures into
//! responses.

pub mod error;
pub mod event;
pub mod storage;
pub mod validation;

// Re-exports for convenience
pub use error::{ErrorKind, FieldError, StoreError, ValidationError};
pub use event::{generate_event_id, Event, EventPatch, EventStatus, NewEvent};
pub use storage::memory::InMemoryEventStore;
pub use storage::{EventFilter, EventStore, SortField, SortKey};
pub use validation::Validator;
