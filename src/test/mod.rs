//! Fixtures and doubles for the unit tests.

#[path = "../../tests/common/fixture.rs"]
pub mod fixture;
pub mod mock;
