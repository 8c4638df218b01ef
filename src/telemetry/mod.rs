//! Diagnostics: throttled failure logging and startup environment report.

pub mod diagnostics;
pub mod throttle;

pub use diagnostics::{log_startup_diagnostics, SystemInfo};
pub use throttle::{LogThrottle, DEFAULT_DIAGNOSTIC_INTERVAL};
