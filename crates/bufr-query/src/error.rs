//! Error types for the query engine.

use thiserror::Error;

/// Result type for query engine operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors that can occur while resolving queries and reconciling results.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The flat schema arrays supplied by the data provider are malformed.
    #[error("invalid schema table for subset {subset}: {reason}")]
    InvalidSchema { subset: String, reason: String },

    /// A query string could not be parsed, or an unsupported query
    /// combination was requested.
    #[error("invalid query {query:?}: {reason}")]
    InvalidQuery { query: String, reason: String },

    /// A query-set configuration document could not be read.
    #[error("invalid query configuration: {0}")]
    InvalidConfig(String),

    /// The requested field name is not part of the accumulated result set.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// No messages have been accumulated yet.
    #[error("no messages have been accumulated")]
    Empty,

    /// A field was asked to report as a different value kind than its
    /// declared unit implies, or mixed value kinds were observed for one
    /// field across messages.
    #[error("type mismatch for field {field}: {reason}")]
    TypeMismatch { field: String, reason: String },

    /// Dense-array inflation produced an impossible shape.
    #[error("inconsistent shape for field {field} in message {message_idx}: {reason}")]
    ShapeInconsistency {
        field: String,
        message_idx: usize,
        reason: String,
    },
}

impl QueryError {
    /// Create an InvalidSchema error.
    pub fn invalid_schema(subset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            subset: subset.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidQuery error.
    pub fn invalid_query(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            query: query.into(),
            reason: reason.into(),
        }
    }

    /// Create a TypeMismatch error.
    pub fn type_mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a ShapeInconsistency error.
    pub fn shape_inconsistency(
        field: impl Into<String>,
        message_idx: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::ShapeInconsistency {
            field: field.into(),
            message_idx,
            reason: reason.into(),
        }
    }
}

impl From<serde_yaml::Error> for QueryError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
