use std::fmt;
use thiserror::Error;

/// A single offending field found while validating a wire record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Wire record did not match the expected schema.
///
/// Every offending field is collected instead of stopping at the first one,
/// so the caller can render all of them next to the form that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid response shape: {}", join_fields(.fields))]
pub struct SchemaError {
    pub fields: Vec<FieldError>,
}

impl SchemaError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError::new(field, message)],
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects field errors while walking a record.
#[derive(Debug, Default)]
pub(crate) struct FieldErrors {
    fields: Vec<FieldError>,
}

impl FieldErrors {
    pub(crate) fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.push(FieldError::new(field, message));
    }

    pub(crate) fn extend(&mut self, other: SchemaError) {
        self.fields.extend(other.fields);
    }

    pub(crate) fn into_error(self) -> SchemaError {
        SchemaError {
            fields: self.fields,
        }
    }

    pub(crate) fn finish<T>(self, value: T) -> Result<T, SchemaError> {
        if self.fields.is_empty() {
            Ok(value)
        } else {
            Err(SchemaError {
                fields: self.fields,
            })
        }
    }
}

/// Rejected edit on a [`crate::MenuDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("Section name must not be empty")]
    EmptySectionName,

    #[error("Section already exists: {0}")]
    DuplicateSection(String),

    #[error("Unknown section: {0}")]
    UnknownSection(String),

    #[error("Menu item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid menu item: {0}")]
    InvalidItem(String),
}

/// Push frame could not be decoded at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    #[error("Malformed push frame: {0}")]
    MalformedFrame(String),

    #[error("Push frame has no type tag")]
    MissingType,
}
