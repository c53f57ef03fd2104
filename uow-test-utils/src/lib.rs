//! Shared testing utilities for the unit-of-work crate.
//!
//! Provides an in-memory SQLite test setup, fixture helpers, and the sample
//! entity models the test suites run against. This crate deliberately does
//! not depend on the `uow` crate itself, so both unit and integration tests
//! can use it without a circular dependency.

pub mod entity;
pub mod error;
pub mod fixtures;
pub mod setup;

pub use error::TestError;
pub use setup::TestSetup;

pub mod prelude {
    pub use crate::{
        entity::prelude::{Gadget, Widget},
        entity::{gadget, widget},
        fixtures::{insert_widget, insert_widgets},
        test_setup_with_tables, TestError, TestSetup,
    };
}
