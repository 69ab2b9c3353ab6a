use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Active,
    Cancelled,
    Completed,
    Postponed,
}

impl EventStatus {
    pub const ALL: [EventStatus; 4] = [
        EventStatus::Active,
        EventStatus::Cancelled,
        EventStatus::Completed,
        EventStatus::Postponed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Completed => "completed",
            EventStatus::Postponed => "postponed",
        }
    }

    /// Parse a status name, ignoring ASCII case.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored event.
///
/// Optional fields serialize as `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub location: Option<String>,
    pub capacity: Option<u32>,
    pub organizer: Option<String>,
    pub status: EventStatus,
}

/// A validated create payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEvent {
    /// Client-chosen id; the store generates one when absent.
    pub event_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub location: Option<String>,
    pub capacity: Option<u32>,
    pub organizer: Option<String>,
    pub status: Option<EventStatus>,
}

impl NewEvent {
    pub fn new(title: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date: date.into(),
            ..Default::default()
        }
    }

    /// Build the stored record under the given id.
    pub fn into_event(self, event_id: String) -> Event {
        Event {
            event_id,
            title: self.title,
            description: self.description,
            date: self.date,
            location: self.location,
            capacity: self.capacity,
            organizer: self.organizer,
            status: self.status.unwrap_or_default(),
        }
    }
}

/// A validated update payload. `None` means "keep the stored value".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<u32>,
    pub organizer: Option<String>,
    pub status: Option<EventStatus>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite only the supplied fields of `event`.
    pub fn apply_to(self, event: &mut Event) {
        if let Some(title) = self.title {
            event.title = title;
        }
        if let Some(description) = self.description {
            event.description = Some(description);
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(location) = self.location {
            event.location = Some(location);
        }
        if let Some(capacity) = self.capacity {
            event.capacity = Some(capacity);
        }
        if let Some(organizer) = self.organizer {
            event.organizer = Some(organizer);
        }
        if let Some(status) = self.status {
            event.status = status;
        }
    }
}

/// Generate a fresh event id.
pub fn generate_event_id() -> String {
    Uuid::new_v4().to_string()
}
