//! Error type definitions.
//!
//! This module defines all error types used throughout the application, from
//! start-up failures to the errors every operation surfaces to its caller.

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// The configured site URL cannot be parsed.
    #[error("Invalid site URL: {0}")]
    SiteUrlError(String),
}

/// Error types for database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreationError(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// A stored value could not be decoded.
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

/// Error raised by a document store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document store SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Document store error: {0}")]
    Backend(String),
}

/// Coarse classification of a failed probe, used for stats and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum UpstreamKind {
    Timeout,
    Connect,
    Request,
    Builder,
    Body,
    Other,
}

/// Error types for redirect resolution.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// The probe never produced a status (network failure, timeout).
    #[error("Request to {url} failed ({kind:?}): {message}")]
    Upstream {
        url: String,
        kind: UpstreamKind,
        message: String,
    },

    /// The URL cannot be turned into something requestable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors surfaced by the public operations.
///
/// Every variant carries the human-readable message shown to the caller.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    SessionExpired(String),

    #[error("{0}")]
    AlreadyRunning(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    UpstreamFailure(String),

    #[error("{0}")]
    PersistenceFailure(String),
}

impl ServiceError {
    /// HTTP status code the API answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::PermissionDenied(_) => 403,
            ServiceError::InvalidToken(_) => 400,
            ServiceError::SessionExpired(_) => 409,
            ServiceError::AlreadyRunning(_) => 409,
            ServiceError::NotFound(_) => 404,
            ServiceError::ValidationError(_) => 400,
            ServiceError::UpstreamFailure(_) => 502,
            ServiceError::PersistenceFailure(_) => 500,
        }
    }

    /// Errors a polling client should stop on instead of retrying.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServiceError::PermissionDenied(_)
                | ServiceError::SessionExpired(_)
                | ServiceError::AlreadyRunning(_)
                | ServiceError::InvalidToken(_)
        )
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(e: DatabaseError) -> Self {
        log::error!("Persistence failure: {e}");
        ServiceError::PersistenceFailure(e.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        log::error!("Document store failure: {e}");
        ServiceError::PersistenceFailure(e.to_string())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::from(DatabaseError::SqlError(e))
    }
}
