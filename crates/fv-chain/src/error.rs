//! Error types for codec operations.

/// Errors that can occur while parsing a log line.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The line does not have the expected number of comma-separated fields.
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// A numeric field failed to parse.
    #[error("invalid numeric field {field:?}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// The activity label is not one of the schema's fixed strings.
    #[error("unknown activity label {0:?}")]
    UnknownActivity(String),

    /// The prev_hash field is not 64 lowercase hex characters.
    #[error("malformed hash field {0:?}")]
    MalformedHash(String),

    /// The timestamp field is empty or contains a field separator.
    #[error("malformed timestamp {0:?}")]
    MalformedTimestamp(String),
}
