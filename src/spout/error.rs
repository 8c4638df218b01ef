//! Error types for the Spout binding

use thiserror::Error;

/// Why a vtable slot could not be turned into a callable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveFailure {
    /// The instance pointer itself is null
    #[error("instance pointer is null")]
    NullInstance,

    /// The first word of the instance (the table address) is null
    #[error("vtable pointer is null")]
    NullTable,

    /// The table entry at the requested index is null
    #[error("slot is empty")]
    EmptySlot,
}

/// Failure to make the shared library resident
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load {library}: {message}{}", .code.map(|c| format!(" (error code {c})")).unwrap_or_default())]
pub struct LoadError {
    /// Library name or path that was attempted
    pub library: String,
    /// Platform error code, when the platform reports one
    pub code: Option<i32>,
    /// Loader message
    pub message: String,
}

/// Errors surfaced by [`SpoutSender`](super::SpoutSender) operations
#[derive(Debug, Error)]
pub enum SenderError {
    /// No module handle has been acquired
    #[error("SpoutLibrary is not resident")]
    NotResident,

    /// Loading the library failed
    #[error(transparent)]
    Load(#[from] LoadError),

    /// `GetSpout()` returned null
    #[error("GetSpout returned a null instance")]
    FactoryReturnedNull,

    /// A vtable slot yielded no callable
    #[error("failed to resolve vtable slot {slot} ({name}): {reason}")]
    Resolve {
        /// Slot index
        slot: usize,
        /// Slot method name
        name: &'static str,
        /// What went wrong
        reason: ResolveFailure,
    },

    /// The foreign call reported failure
    #[error("{0} returned false")]
    CallReturnedFalse(&'static str),

    /// A Rust panic unwound out of the call instead of a return
    #[error("{0} faulted")]
    CallFaulted(&'static str),

    /// Operation needs an instance but the handle holds none
    #[error("sender instance pointer is null")]
    NullInstance,

    /// `initialize` on a handle that is already Ready
    #[error("sender is already initialized")]
    AlreadyInitialized,

    /// `initialize` on a handle that has been disposed
    #[error("sender has been released")]
    Released,

    /// Frame operation on a handle that is not Ready
    #[error("sender is not ready")]
    NotReady,

    /// Rejected sender configuration
    #[error("invalid sender configuration: {0}")]
    InvalidConfig(String),

    /// Texture name 0
    #[error("invalid texture id")]
    InvalidTexture,

    /// Pixel buffer does not match the configured frame size
    #[error("image buffer is {actual} bytes, expected {expected}")]
    InvalidImage {
        /// `width * height * 4`
        expected: usize,
        /// Length of the supplied buffer
        actual: usize,
    },
}

/// Result type for sender operations
pub type SenderResult<T> = Result<T, SenderError>;

impl SenderError {
    /// Build a resolution error for slot `S`
    pub(crate) fn resolve<S: super::ffi_types::Slot>(reason: ResolveFailure) -> Self {
        SenderError::Resolve {
            slot: S::INDEX,
            name: S::NAME,
            reason,
        }
    }
}
