use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Machine-readable classification of a single field failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Missing,
    NotAString,
    NotAnInteger,
    NotAnObject,
    ExtraField,
    TooShort,
    TooLong,
    NotGreaterThan,
    NotLessOrEqual,
    InvalidDate,
    InvalidChoice,
    InvalidPattern,
}

impl ErrorKind {
    /// The `type` tag reported to clients.
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorKind::Missing => "value_error.missing",
            ErrorKind::NotAString => "type_error.str",
            ErrorKind::NotAnInteger => "type_error.integer",
            ErrorKind::NotAnObject => "type_error.dict",
            ErrorKind::ExtraField => "value_error.extra",
            ErrorKind::TooShort => "value_error.any_str.min_length",
            ErrorKind::TooLong => "value_error.any_str.max_length",
            ErrorKind::NotGreaterThan => "value_error.number.not_gt",
            ErrorKind::NotLessOrEqual => "value_error.number.not_le",
            ErrorKind::InvalidDate => "value_error.date",
            ErrorKind::InvalidChoice => "value_error.enum",
            ErrorKind::InvalidPattern => "value_error.str.regex",
        }
    }

    /// Schema errors describe a payload of the wrong shape (missing, wrong
    /// type, unexpected). Everything else is a business-rule violation.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::Missing
                | ErrorKind::NotAString
                | ErrorKind::NotAnInteger
                | ErrorKind::NotAnObject
                | ErrorKind::ExtraField
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

/// A single violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            kind,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("At least one field must be provided for update")]
    EmptyUpdate,

    #[error("Validation failed for {} field(s)", .0.len())]
    Fields(Vec<FieldError>),
}

impl ValidationError {
    /// Field-level errors, in the order they were found.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ValidationError::EmptyUpdate => &[],
            ValidationError::Fields(errors) => errors,
        }
    }

    /// True when at least one error is a schema error rather than a rule
    /// violation.
    pub fn has_schema_errors(&self) -> bool {
        self.field_errors().iter().any(|e| e.kind.is_schema_error())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Event not found: {0}")]
    NotFound(String),

    #[error("Event already exists: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}
