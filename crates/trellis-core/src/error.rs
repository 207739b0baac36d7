//! Error types for Trellis Core

use thiserror::Error;

/// Result type alias using Trellis Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the translation engine
#[derive(Error, Debug)]
pub enum Error {
    /// Schema model construction errors (duplicate properties, unknown
    /// target types, malformed rule combinations)
    #[error("Schema error: {0}")]
    Schema(String),

    /// Translation-time errors (unknown field, invalid operator). Raised
    /// before any Cypher is built; never reaches the database.
    #[error("Translation error: {0}")]
    Translation(String),

    /// Unknown field on a filter, projection, or mutation input
    #[error("Unknown field `{field}` on type `{type_name}`")]
    UnknownField {
        /// Field name as it appeared in the operation
        field: String,
        /// Schema type the field was looked up on
        type_name: String,
    },

    /// Operator suffix not applicable to the field's kind
    #[error("Invalid operator `{operator}` for field `{field}`")]
    InvalidOperator {
        /// The operator suffix
        operator: String,
        /// The field it was applied to
        field: String,
    },

    /// Authorization validation failure, surfaced without rule detail
    #[error("Forbidden")]
    Forbidden,

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a translation error
    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation(msg.into())
    }

    /// Create an unknown-field error
    pub fn unknown_field(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    /// Create an invalid-operator error
    pub fn invalid_operator(operator: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidOperator {
            operator: operator.into(),
            field: field.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
