//! Connection configuration for the unit-of-work provider.

use crate::error::ConfigError;

/// Database connection settings.
///
/// The writer URL is always required. Setting a reader URL enables read/write
/// splitting: [`crate::UnitOfWorkProvider::read_write`] hands out units of
/// work with an independent read-only connection.
#[derive(Clone, Debug)]
pub struct Config {
    /// Connection URL for the writer database.
    pub database_url: String,
    /// Optional connection URL for a read-only replica.
    pub reader_database_url: Option<String>,
}

impl Config {
    /// Creates a single-database configuration.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            reader_database_url: None,
        }
    }

    /// Adds a read-only replica URL, enabling read/write splitting.
    pub fn with_reader(mut self, reader_database_url: impl Into<String>) -> Self {
        self.reader_database_url = Some(reader_database_url.into());
        self
    }

    /// Reads the configuration from `DATABASE_URL` and `READER_DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingDatabaseUrl)?,
            reader_database_url: std::env::var("READER_DATABASE_URL").ok(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Rejects empty connection URLs before any connection attempt is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        if let Some(reader_url) = &self.reader_database_url {
            if reader_url.trim().is_empty() {
                return Err(ConfigError::EmptyReaderDatabaseUrl);
            }
        }

        Ok(())
    }
}
