//! # spout-bridge
//!
//! Spout texture sender for hosts that render with OpenGL on Windows.
//!
//! SpoutLibrary is loaded at runtime and driven through the vtable of the
//! object returned by its `GetSpout()` export:
//! - [`spout::ModuleResidency`] - makes the library resident once per process
//! - [`spout::SpoutSender`] - sender lifecycle and per-frame texture sharing
//! - [`config`] - TOML configuration
//! - [`telemetry`] - throttled diagnostics
//!
//! # Data Flow
//!
//! **Setup:** Config → ModuleResidency → GetSpout() → SetSenderName / SetSenderFormat
//!
//! **Per frame:** Host texture id → SendTexture → Spout receivers
//!
//! **Shutdown:** ReleaseSender(0)

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Configuration
pub mod config;

/// SpoutLibrary binding: loading, vtable dispatch, sender lifecycle
pub mod spout;

/// Telemetry: throttled logging and startup diagnostics
pub mod telemetry;
