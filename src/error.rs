//! Error types for the unit-of-work layer.
//!
//! This layer performs no recovery: configuration problems are raised before
//! any store interaction, database failures surface unchanged through the
//! transparent [`sea_orm::DbErr`] variant, and nothing is ever swallowed.
//! Callers needing fallback behavior wrap `save_changes` themselves.

use thiserror::Error;

/// Main error type for the unit-of-work layer.
///
/// Aggregates configuration errors and database errors into a single type.
/// `thiserror`'s `#[from]` attribute enables automatic conversion from the
/// underlying error types via the `?` operator.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing or empty connection URLs).
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Database error (query failures, connection issues, constraint violations).
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
    /// The unit of work has released its data context handle; no further
    /// database operations are possible through it.
    #[error("unit of work is closed; its data context handle has been released")]
    ContextClosed,
}

/// Configuration error (missing or invalid connection settings).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `DATABASE_URL` is not set or is empty.
    #[error("DATABASE_URL is not set or is empty")]
    MissingDatabaseUrl,
    /// `READER_DATABASE_URL` is set but empty.
    #[error("READER_DATABASE_URL is set but empty")]
    EmptyReaderDatabaseUrl,
    /// A read/write-split unit of work was requested but no reader database
    /// is configured.
    #[error("read/write splitting requested but no READER_DATABASE_URL is configured")]
    MissingReaderDatabaseUrl,
}
