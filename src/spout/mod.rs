//! Runtime binding to SpoutLibrary.
//!
//! ```text
//! ModuleResidency ──load──> ModuleHandle ──GetSpout()──> SpoutInstance
//!                                │                          │
//!                          SpoutSender ──vtable slots──────┘
//! ```
//!
//! The library exports one factory; every other operation is a positional
//! vtable call on the object it returns. See [`ffi_types`] for the slot table.

pub mod error;
pub mod ffi_types;
pub mod frame;
pub mod loader;
pub mod sender;
pub mod vtable;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{LoadError, ResolveFailure, SenderError, SenderResult};
pub use frame::{FrameStats, TextureId};
pub use loader::{
    InstanceFactory, LibraryLoader, ModuleHandle, ModuleProvider, ModuleResidency,
    LIBRARY_PATH_ENV,
};
pub use sender::{LifecycleState, SenderConfig, SpoutSender};
