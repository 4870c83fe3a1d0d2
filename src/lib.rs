pub mod core;
pub mod events;
pub mod logging;
pub mod tests_support;

// Shortcuts for the CLI and integration tests.
pub use core::connection::Connection;
pub use core::profile::TunnelProfile;
