use tabula_core::Error;
use thiserror::Error;

/// SQLSTATE raised by PostgreSQL when a relation already exists.
pub const DUPLICATE_TABLE_SQLSTATE: &str = "42P07";

/// SQLSTATE raised when a statement is cancelled, including by `statement_timeout`.
pub const QUERY_CANCELED_SQLSTATE: &str = "57014";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("relation already exists: {0}")]
    DuplicateObject(String),

    #[error("statement cancelled: {0}")]
    QueryCanceled(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to decode column '{column}' of type {type_name}: {message}")]
    Decode {
        column: String,
        type_name: String,
        message: String,
    },

    #[error("row has {actual} values but the result has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Split duplicate-relation and cancellation failures out of generic
    /// database errors.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some(DUPLICATE_TABLE_SQLSTATE) => {
                    return StorageError::DuplicateObject(db.message().to_string())
                }
                Some(QUERY_CANCELED_SQLSTATE) => {
                    return StorageError::QueryCanceled(db.message().to_string())
                }
                _ => {}
            }
        }
        StorageError::Database(err)
    }

    pub fn is_duplicate_object(&self) -> bool {
        matches!(self, StorageError::DuplicateObject(_))
    }

    /// Classify as an internal engine error, keeping this error as the cause.
    pub fn into_internal(self, context: &str) -> Error {
        Error::internal(context, self)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
