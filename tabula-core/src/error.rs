use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Boxed cause carried by internal errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error classification surfaced to the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Client-caused, not retryable.
    Validation,
    /// Backend or infrastructure fault.
    Internal,
    /// Reserved; nothing in the engine produces it today.
    NotFound,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::NotFound => "NOT_FOUND",
        }
    }
}

/// A query rejected by the safety policy.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct QueryValidationError {
    pub message: String,
    pub query: String,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid query: {0}")]
    ForbiddenQuery(#[from] QueryValidationError),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("{context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Wrap a backend failure with a short description of the failed step.
    pub fn internal(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Internal {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::ForbiddenQuery(_) | Error::TableExists(_) => {
                ErrorKind::Validation
            }
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Timeout(_) | Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

pub type Result<T> = std::result::Result<T, Error>;
