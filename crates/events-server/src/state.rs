use std::sync::Arc;
use std::time::Duration;

use events_core::{EventStore, InMemoryEventStore, StoreError, Validator};
use events_db::{init_database, RedbEventStore};

use crate::config::{Config, StoreBackend};

/// Upper bound on a single store call unless configured otherwise.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub validator: Validator,
    pub store_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            validator: Validator::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Open the configured store and build the state around it.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let store: Arc<dyn EventStore> = match config.store {
            StoreBackend::Memory => Arc::new(InMemoryEventStore::new()),
            StoreBackend::Redb => Arc::new(RedbEventStore::new(init_database(&config.db_path)?)),
        };

        Ok(Self::new(store)
            .with_validator(Validator::with_strict(config.strict_fields))
            .with_store_timeout(config.request_timeout))
    }
}
