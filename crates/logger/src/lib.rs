//! Shared tracing setup for the service monitor binaries.

mod tracing;

pub use self::tracing::{LogFormat, LogSettings, init, init_with};
