//! Repository and unit-of-work layer over SeaORM.
//!
//! This crate provides a transactional scope (a unit of work) that owns one or
//! two database connection handles, hands out one cached [`Repository`] per
//! entity type, stages all inserts, updates, and deletes in memory, and flushes
//! the whole changeset atomically in a single transaction on
//! [`UnitOfWork::save_changes`]. An optional second read-only connection allows
//! read/write splitting: queries routed through
//! [`ReadWriteUnitOfWork::reader_repository`] never touch the writer.
//!
//! The crate performs no persistence mechanics of its own. Query translation,
//! pooling, and transaction execution are delegated to SeaORM; this layer only
//! manages object identity and scoping around it, and store failures propagate
//! to callers unchanged.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod provider;
pub mod repository;
pub mod unit_of_work;

pub use config::Config;
pub use context::DataContext;
pub use error::{ConfigError, Error};
pub use provider::UnitOfWorkProvider;
pub use repository::{QueryOptions, Repository};
pub use unit_of_work::{ReadWriteUnitOfWork, UnitOfWork};
