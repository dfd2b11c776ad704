//! Fixtures and in-memory collaborators shared by the unit tests
mod fakes;
mod fixtures;

pub use fakes::*;
pub use fixtures::*;
