//! Connection provider minting unit-of-work instances.
//!
//! The provider is the registration surface of this crate: it connects the
//! pooled writer (and optional reader) once at startup and then hands out a
//! fresh unit of work per logical scope. Each unit of work gets its own data
//! context and changeset over a cheap clone of the pooled connection handle.

use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::{
    config::Config,
    error::{ConfigError, Error},
    unit_of_work::{ReadWriteUnitOfWork, UnitOfWork},
};

/// Factory for per-scope unit-of-work instances over pooled connections.
pub struct UnitOfWorkProvider {
    writer: DatabaseConnection,
    reader: Option<DatabaseConnection>,
}

impl UnitOfWorkProvider {
    /// Validates the configuration and connects the writer pool, plus the
    /// reader pool when a reader URL is configured.
    ///
    /// Invalid configuration fails here, before any connection attempt.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let writer = Database::connect(Self::connect_options(&config.database_url)).await?;

        let reader = match &config.reader_database_url {
            Some(reader_url) => {
                Some(Database::connect(Self::connect_options(reader_url)).await?)
            }
            None => None,
        };

        tracing::info!(
            read_write_split = reader.is_some(),
            "connected unit of work provider"
        );

        Ok(Self { writer, reader })
    }

    fn connect_options(url: &str) -> ConnectOptions {
        let mut opt = ConnectOptions::new(url);
        opt.sqlx_logging(false);
        opt
    }

    /// Mints a single-context unit of work over the writer pool.
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(self.writer.clone())
    }

    /// Mints a read/write-split unit of work.
    ///
    /// Fails with [`ConfigError::MissingReaderDatabaseUrl`] when the provider
    /// was configured without a reader database.
    pub fn read_write(&self) -> Result<ReadWriteUnitOfWork, Error> {
        let reader = self
            .reader
            .clone()
            .ok_or(ConfigError::MissingReaderDatabaseUrl)?;

        Ok(ReadWriteUnitOfWork::new(self.writer.clone(), reader))
    }

    /// Shuts down the underlying connection pools.
    pub async fn close(&self) -> Result<(), Error> {
        if let Some(reader) = &self.reader {
            reader.close_by_ref().await?;
        }

        self.writer.close_by_ref().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    mod connect {
        use crate::{config::Config, error::{ConfigError, Error}, provider::UnitOfWorkProvider};

        /// Expect Error before any connection attempt for an empty writer URL
        #[tokio::test]
        async fn rejects_invalid_configuration() {
            let result = UnitOfWorkProvider::connect(&Config::new("")).await;

            assert!(matches!(
                result,
                Err(Error::Config(ConfigError::MissingDatabaseUrl))
            ));
        }
    }

    mod read_write {
        use uow_test_utils::prelude::*;

        use crate::{config::Config, error::{ConfigError, Error}, provider::UnitOfWorkProvider};

        /// Expect Error when requesting read/write splitting without a
        /// configured reader
        #[tokio::test]
        async fn fails_without_reader_database() -> Result<(), TestError> {
            let provider = UnitOfWorkProvider::connect(&Config::new("sqlite::memory:"))
                .await
                .expect("provider connect failed");

            let result = provider.read_write();

            assert!(matches!(
                result,
                Err(Error::Config(ConfigError::MissingReaderDatabaseUrl))
            ));

            Ok(())
        }
    }

    mod unit_of_work {
        use sea_orm::{ConnectionTrait, DbBackend, Schema};
        use uow_test_utils::prelude::*;

        use crate::{config::Config, provider::UnitOfWorkProvider};

        /// Expect units of work from one provider to share the same store
        #[tokio::test]
        async fn minted_units_share_the_store() -> Result<(), TestError> {
            let provider = UnitOfWorkProvider::connect(&Config::new("sqlite::memory:"))
                .await
                .expect("provider connect failed");

            let schema = Schema::new(DbBackend::Sqlite);
            let first = provider.unit_of_work();
            first
                .repository::<widget::Entity>()
                .context()
                .connection()
                .expect("context closed")
                .execute(&schema.create_table_from_entity(Widget))
                .await?;

            first
                .repository::<widget::Entity>()
                .add(widget::Model {
                    id: 1111,
                    name: "x".to_string(),
                })
                .expect("staging failed");
            first.save_changes().await.expect("commit failed");

            let second = provider.unit_of_work();
            let found = second
                .repository::<widget::Entity>()
                .get_by_id(1111)
                .await
                .expect("lookup failed");

            assert_eq!(found.map(|widget| widget.name), Some("x".to_string()));

            Ok(())
        }
    }
}
