//! Helpers shared between unit tests and integration tests.
pub mod event_assert;
pub mod fixtures;
pub mod recorder;
pub mod wait;
