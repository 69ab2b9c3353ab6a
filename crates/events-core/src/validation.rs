use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, FieldError, ValidationError};
use crate::event::{EventPatch, EventStatus, NewEvent};

/// Maximum length of a client-supplied event id.
pub const MAX_EVENT_ID_LEN: usize = 128;
/// Upper bound for `capacity`.
pub const MAX_CAPACITY: i64 = 100_000;

/// Constraint attached to a field.
#[derive(Debug, Clone, Copy)]
enum Rule {
    Text { min: usize, max: usize },
    Integer { gt: i64, le: i64 },
    Date,
    Status,
    Identifier { max: usize },
}

/// Declarative description of one payload field.
#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    rule: Rule,
    required: bool,
}

impl FieldSpec {
    const fn required(name: &'static str, rule: Rule) -> Self {
        Self {
            name,
            rule,
            required: true,
        }
    }

    const fn optional(name: &'static str, rule: Rule) -> Self {
        Self {
            name,
            rule,
            required: false,
        }
    }
}

const EVENT_ID_FIELD: FieldSpec = FieldSpec::optional(
    "eventId",
    Rule::Identifier {
        max: MAX_EVENT_ID_LEN,
    },
);

const EVENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("title", Rule::Text { min: 1, max: 200 }),
    FieldSpec::optional("description", Rule::Text { min: 1, max: 2000 }),
    FieldSpec::required("date", Rule::Date),
    FieldSpec::optional("location", Rule::Text { min: 1, max: 300 }),
    FieldSpec::optional(
        "capacity",
        Rule::Integer {
            gt: 0,
            le: MAX_CAPACITY,
        },
    ),
    FieldSpec::optional("organizer", Rule::Text { min: 1, max: 200 }),
    FieldSpec::optional("status", Rule::Status),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Create,
    Update,
}

/// A value that passed its field's rule.
#[derive(Debug, Clone)]
enum Accepted {
    Text(String),
    Integer(i64),
    Status(EventStatus),
}

impl Rule {
    fn check(&self, field: &str, value: &Value) -> Result<Accepted, FieldError> {
        match *self {
            Rule::Text { min, max } => {
                let text = expect_str(field, value)?;
                check_length(field, text, min, max)?;
                Ok(Accepted::Text(text.to_string()))
            }
            Rule::Integer { gt, le } => {
                let n = expect_integer(field, value, le)?;
                if n <= gt {
                    return Err(FieldError::new(
                        field,
                        ErrorKind::NotGreaterThan,
                        format!("ensure this value is greater than {}", gt),
                    ));
                }
                if n > le {
                    return Err(not_le(field, le));
                }
                Ok(Accepted::Integer(n))
            }
            Rule::Date => {
                let text = expect_str(field, value)?;
                if !is_iso_date(text) {
                    return Err(FieldError::new(
                        field,
                        ErrorKind::InvalidDate,
                        "Date must be in ISO format (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)",
                    ));
                }
                Ok(Accepted::Text(text.to_string()))
            }
            Rule::Status => {
                let text = expect_str(field, value)?;
                EventStatus::parse(text).map(Accepted::Status).ok_or_else(|| {
                    let allowed: Vec<&str> = EventStatus::ALL.iter().map(|s| s.as_str()).collect();
                    FieldError::new(
                        field,
                        ErrorKind::InvalidChoice,
                        format!("Status must be one of: {}", allowed.join(", ")),
                    )
                })
            }
            Rule::Identifier { max } => {
                let text = expect_str(field, value)?;
                check_length(field, text, 1, max)?;
                if !text
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(FieldError::new(
                        field,
                        ErrorKind::InvalidPattern,
                        "eventId may only contain letters, digits, '-' and '_'",
                    ));
                }
                Ok(Accepted::Text(text.to_string()))
            }
        }
    }
}

fn expect_str<'a>(field: &str, value: &'a Value) -> Result<&'a str, FieldError> {
    value
        .as_str()
        .ok_or_else(|| FieldError::new(field, ErrorKind::NotAString, "str type expected"))
}

fn expect_integer(field: &str, value: &Value, le: i64) -> Result<i64, FieldError> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    // Integers beyond i64 are still integers, just out of range.
    if value.is_u64() {
        return Err(not_le(field, le));
    }
    // Whole floats such as `100.0` are integers in lax mode.
    if let Some(f) = value.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0) {
        if f > i64::MAX as f64 {
            return Err(not_le(field, le));
        }
        if f >= i64::MIN as f64 {
            return Ok(f as i64);
        }
    }
    Err(FieldError::new(
        field,
        ErrorKind::NotAnInteger,
        "value is not a valid integer",
    ))
}

fn not_le(field: &str, le: i64) -> FieldError {
    FieldError::new(
        field,
        ErrorKind::NotLessOrEqual,
        format!("ensure this value is less than or equal to {}", le),
    )
}

fn check_length(field: &str, text: &str, min: usize, max: usize) -> Result<(), FieldError> {
    let len = text.chars().count();
    if len < min {
        return Err(FieldError::new(
            field,
            ErrorKind::TooShort,
            format!("ensure this value has at least {} characters", min),
        ));
    }
    if len > max {
        return Err(FieldError::new(
            field,
            ErrorKind::TooLong,
            format!("ensure this value has at most {} characters", max),
        ));
    }
    Ok(())
}

/// Naive timestamp layouts accepted after the date part.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Accepts `YYYY-MM-DD`, or that date followed by a `T` or space separated
/// time (`HH:MM`, `HH:MM:SS`, fractional seconds), optionally with a `Z` or
/// `+HH:MM` offset.
fn is_iso_date(text: &str) -> bool {
    let Some(date) = text.get(..10) else {
        return false;
    };
    if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return false;
    }
    if text.len() == 10 {
        return true;
    }

    DateTime::parse_from_rfc3339(text).is_ok()
        || DATETIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(text, format).is_ok())
        || DATETIME_FORMATS.iter().any(|format| {
            DateTime::parse_from_str(text, &format!("{}%:z", format)).is_ok()
        })
}

/// Values that passed validation, keyed by field name.
struct AcceptedFields(HashMap<&'static str, Accepted>);

impl AcceptedFields {
    fn text(&mut self, name: &str) -> Option<String> {
        match self.0.remove(name) {
            Some(Accepted::Text(text)) => Some(text),
            _ => None,
        }
    }

    fn capacity(&mut self) -> Option<u32> {
        match self.0.remove("capacity") {
            Some(Accepted::Integer(n)) => u32::try_from(n).ok(),
            _ => None,
        }
    }

    fn status(&mut self) -> Option<EventStatus> {
        match self.0.remove("status") {
            Some(Accepted::Status(status)) => Some(status),
            _ => None,
        }
    }
}

/// Validates event payloads against the field table.
///
/// All violations of a payload are collected; validation never stops at the
/// first failing field.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    strict: bool,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// In strict mode unknown fields are reported as errors instead of being
    /// ignored.
    pub fn with_strict(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Validate a create payload. `title` and `date` are required.
    pub fn validate_create(&self, body: &Value) -> Result<NewEvent, ValidationError> {
        let mut fields = self.evaluate(body, Mode::Create)?;

        // Required fields are guaranteed present once evaluate succeeds.
        Ok(NewEvent {
            event_id: fields.text("eventId"),
            title: fields.text("title").unwrap_or_default(),
            description: fields.text("description"),
            date: fields.text("date").unwrap_or_default(),
            location: fields.text("location"),
            capacity: fields.capacity(),
            organizer: fields.text("organizer"),
            status: fields.status(),
        })
    }

    /// Validate an update payload. Every field is optional, but at least one
    /// must be supplied.
    pub fn validate_update(&self, body: &Value) -> Result<EventPatch, ValidationError> {
        let mut fields = self.evaluate(body, Mode::Update)?;

        let patch = EventPatch {
            title: fields.text("title"),
            description: fields.text("description"),
            date: fields.text("date"),
            location: fields.text("location"),
            capacity: fields.capacity(),
            organizer: fields.text("organizer"),
            status: fields.status(),
        };
        if patch.is_empty() {
            return Err(ValidationError::EmptyUpdate);
        }
        Ok(patch)
    }

    fn evaluate(&self, body: &Value, mode: Mode) -> Result<AcceptedFields, ValidationError> {
        let Some(object) = body.as_object() else {
            return Err(ValidationError::Fields(vec![FieldError::new(
                "body",
                ErrorKind::NotAnObject,
                "value is not a valid dict",
            )]));
        };

        let specs: Vec<&FieldSpec> = match mode {
            Mode::Create => std::iter::once(&EVENT_ID_FIELD).chain(EVENT_FIELDS).collect(),
            Mode::Update => EVENT_FIELDS.iter().collect(),
        };

        let mut accepted = HashMap::new();
        let mut errors = Vec::new();

        for spec in &specs {
            match object.get(spec.name) {
                None | Some(Value::Null) => {
                    if spec.required && mode == Mode::Create {
                        errors.push(FieldError::new(
                            spec.name,
                            ErrorKind::Missing,
                            "field required",
                        ));
                    }
                }
                Some(value) => match spec.rule.check(spec.name, value) {
                    Ok(value) => {
                        accepted.insert(spec.name, value);
                    }
                    Err(error) => errors.push(error),
                },
            }
        }

        if self.strict {
            errors.extend(unknown_fields(object, &specs));
        }

        if !errors.is_empty() {
            return Err(ValidationError::Fields(errors));
        }
        Ok(AcceptedFields(accepted))
    }
}

fn unknown_fields(object: &Map<String, Value>, specs: &[&FieldSpec]) -> Vec<FieldError> {
    object
        .keys()
        .filter(|key| !specs.iter().any(|spec| spec.name == key.as_str()))
        .map(|key| FieldError::new(key.as_str(), ErrorKind::ExtraField, "extra fields not permitted"))
        .collect()
}
