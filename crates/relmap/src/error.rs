//! Error types for relmap

use thiserror::Error;

/// Result type alias for relmap operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for mapping, planning and database operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Mapping configuration error on a specific type
    #[error("Mapping error on '{type_name}': {message}")]
    Mapping { type_name: String, message: String },

    /// A type reaches itself through its own relations
    #[error("Mapping cycle detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Invalid statement input (unknown alias reference, bad identifier, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a mapping error for a specific type
    pub fn mapping(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create a cycle error from the chain of type names
    pub fn cycle(chain: Vec<String>) -> Self {
        Self::Cycle { chain }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a mapping configuration error (including cycles)
    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping { .. } | Self::Cycle { .. })
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
