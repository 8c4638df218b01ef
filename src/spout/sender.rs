#![expect(unsafe_code, reason = "FFI calls through SpoutLibrary vtable pointers")]

//! Spout sender lifecycle.
//!
//! A [`SpoutSender`] owns one SpoutLibrary instance obtained from `GetSpout()`
//! and walks it through `Uninitialized -> Ready -> Released`. All calls into
//! the instance go through the cached vtable slots; every foreign failure is
//! turned into a [`SenderError`] and, on the boolean API, a log line.
//!
//! The instance is never destroyed with its `Release()` method: that slot's
//! index depends on the full interface of the library build and is not part
//! of the binding. The object lives until the library unloads.

use std::{
    ffi::{CStr, CString},
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
};

use tracing::{debug, error, info, warn};

use super::{
    error::{SenderError, SenderResult},
    ffi_types::{
        IsInitialized, ReleaseSender, SetSenderFormat, SetSenderName, Slot, SpoutInstance,
        DXGI_FORMAT_R8G8B8A8_UNORM, MAX_SENDER_NAME_LEN, RELEASE_IMMEDIATELY,
    },
    frame::FrameStats,
    loader::{ModuleHandle, ModuleResidency},
    vtable::SlotCache,
};
use crate::telemetry::LogThrottle;

/// Name and frame size of a sender. Fixed once the sender is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    name: String,
    width: u32,
    height: u32,
}

impl SenderConfig {
    /// Validate and build a sender configuration.
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> SenderResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(SenderError::InvalidConfig("sender name is empty".into()));
        }
        if name.len() > MAX_SENDER_NAME_LEN {
            return Err(SenderError::InvalidConfig(format!(
                "sender name is {} bytes, maximum is {MAX_SENDER_NAME_LEN}",
                name.len()
            )));
        }
        if name.contains('\0') {
            return Err(SenderError::InvalidConfig(
                "sender name contains a NUL byte".into(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(SenderError::InvalidConfig(format!(
                "invalid frame size {width}x{height}"
            )));
        }
        Ok(Self {
            name,
            width,
            height,
        })
    }

    /// Sender name as seen by receivers.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    fn c_name(&self) -> SenderResult<CString> {
        CString::new(self.name.as_str()).map_err(|e| SenderError::InvalidConfig(e.to_string()))
    }
}

impl fmt::Display for SenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

/// Where a sender is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No instance held; `initialize` may be called.
    Uninitialized,
    /// Instance held and named; frames can be sent.
    Ready,
    /// Instance released. Terminal.
    Released,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => write!(f, "uninitialized"),
            LifecycleState::Ready => write!(f, "ready"),
            LifecycleState::Released => write!(f, "released"),
        }
    }
}

/// One Spout sender backed by a SpoutLibrary instance.
///
/// Not thread-safe: the instance is bound to the GL context of the thread
/// that drives it, and callers must serialize access.
pub struct SpoutSender {
    module: Option<ModuleHandle>,
    instance: *mut SpoutInstance,
    config: Option<SenderConfig>,
    state: LifecycleState,
    slots: SlotCache,
    pub(super) send_throttle: LogThrottle,
    pub(super) stats: FrameStats,
}

impl SpoutSender {
    /// A sender that has not been initialized yet.
    pub fn new() -> Self {
        Self::with_diagnostic_interval(crate::telemetry::DEFAULT_DIAGNOSTIC_INTERVAL)
    }

    /// Like [`new`](Self::new), logging per-frame failures once per `interval`.
    pub fn with_diagnostic_interval(interval: u64) -> Self {
        Self {
            module: None,
            instance: std::ptr::null_mut(),
            config: None,
            state: LifecycleState::Uninitialized,
            slots: SlotCache::default(),
            send_throttle: LogThrottle::new(interval),
            stats: FrameStats::default(),
        }
    }

    /// Create and name the foreign sender. Returns false on any failure.
    pub fn initialize(
        &mut self,
        residency: &ModuleResidency,
        name: &str,
        width: u32,
        height: u32,
    ) -> bool {
        let result = SenderConfig::new(name, width, height)
            .and_then(|config| self.try_initialize(residency, config));
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Spout sender initialization failed: {e}");
                false
            }
        }
    }

    /// Create and name the foreign sender.
    ///
    /// `SetSenderName` must succeed. `SetSenderFormat` (RGBA8) is skipped
    /// with a warning if the slot is missing. On failure any instance that
    /// was obtained is released again and the state stays `Uninitialized`.
    pub fn try_initialize(
        &mut self,
        residency: &ModuleResidency,
        config: SenderConfig,
    ) -> SenderResult<()> {
        match self.state {
            LifecycleState::Uninitialized => {}
            LifecycleState::Ready => return Err(SenderError::AlreadyInitialized),
            LifecycleState::Released => return Err(SenderError::Released),
        }

        let module = residency.handle().ok_or(SenderError::NotResident)?;
        let name = config.c_name()?;

        let instance = module.create_instance();
        if instance.is_null() {
            return Err(SenderError::FactoryReturnedNull);
        }
        debug!("GetSpout returned {instance:p} from {}", module.origin());

        self.module = Some(module);
        self.instance = instance;
        self.slots.bind(instance);

        if let Err(e) = self.configure(&name) {
            self.release_instance();
            self.module = None;
            return Err(e);
        }

        info!("Spout sender initialized: {config}");
        self.config = Some(config);
        self.state = LifecycleState::Ready;
        Ok(())
    }

    fn configure(&mut self, name: &CStr) -> SenderResult<()> {
        let set_name = self.resolved::<SetSenderName>()?;
        self.guarded::<SetSenderName, _>(|this| unsafe { set_name(this, name.as_ptr()) })?;

        match self.resolved::<SetSenderFormat>() {
            Ok(set_format) => {
                self.guarded::<SetSenderFormat, _>(|this| unsafe {
                    set_format(this, DXGI_FORMAT_R8G8B8A8_UNORM)
                })?;
            }
            Err(e) => warn!("{e}; using the library's default sender format"),
        }
        Ok(())
    }

    /// True while an instance is held. Does not ask the library.
    pub fn is_ready(&self) -> bool {
        !self.instance.is_null()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Configuration applied by the last successful `initialize`.
    pub fn config(&self) -> Option<&SenderConfig> {
        self.config.as_ref()
    }

    /// Module the instance came from, while one is held.
    pub fn module(&self) -> Option<&ModuleHandle> {
        self.module.as_ref()
    }

    /// Ask the library whether its sender is initialized. False on any failure.
    pub fn query_foreign_ready(&mut self) -> bool {
        match self.try_query_foreign_ready() {
            Ok(ready) => ready,
            Err(SenderError::NullInstance) => false,
            Err(e) => {
                error!("IsInitialized query failed: {e}");
                false
            }
        }
    }

    /// Ask the library whether its sender is initialized.
    pub fn try_query_foreign_ready(&mut self) -> SenderResult<bool> {
        let is_initialized = self.resolved::<IsInitialized>()?;
        self.guarded::<IsInitialized, _>(|this| unsafe { is_initialized(this) })
    }

    /// Release the foreign sender. Idempotent.
    ///
    /// `ReleaseSender(0)` is attempted if the slot resolves; the instance
    /// pointer is cleared regardless.
    pub fn dispose(&mut self) {
        if self.instance.is_null() {
            return;
        }
        self.release_instance();
        self.module = None;
        self.state = LifecycleState::Released;
        match &self.config {
            Some(config) => info!("Spout sender released: {}", config.name()),
            None => info!("Spout sender released"),
        }
    }

    fn release_instance(&mut self) {
        if let Ok(release) = self.resolved::<ReleaseSender>() {
            if let Err(e) = self.guarded::<ReleaseSender, _>(|this| unsafe {
                release(this, RELEASE_IMMEDIATELY)
            }) {
                error!("Exception during Spout disposal: {e}");
            }
        }
        self.instance = std::ptr::null_mut();
        self.slots.invalidate();
    }

    /// Resolve slot `S` on the held instance.
    pub(super) fn resolved<S: Slot>(&mut self) -> SenderResult<S::Fn> {
        if self.instance.is_null() {
            return Err(SenderError::NullInstance);
        }
        // Safety: the cache is bound to `self.instance`, which came from
        // `GetSpout()` and has not been released.
        unsafe { self.slots.get::<S>() }.map_err(SenderError::resolve::<S>)
    }

    /// Run a foreign call for slot `S`, converting a Rust panic into `CallFaulted`.
    ///
    /// Only Rust panics are caught. A C++ exception crossing the boundary
    /// aborts the process, and access violations are not unwinds at all.
    pub(super) fn guarded<S: Slot, R>(
        &self,
        call: impl FnOnce(*mut SpoutInstance) -> R,
    ) -> SenderResult<R> {
        if self.instance.is_null() {
            return Err(SenderError::NullInstance);
        }
        let instance = self.instance;
        catch_unwind(AssertUnwindSafe(|| call(instance)))
            .map_err(|_| SenderError::CallFaulted(S::NAME))
    }

    /// Frame size while Ready.
    pub(super) fn frame_size(&self) -> Option<(u32, u32)> {
        match (&self.config, self.is_ready()) {
            (Some(config), true) => Some((config.width, config.height)),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_slots(&self) -> usize {
        self.slots.len()
    }
}

impl Default for SpoutSender {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpoutSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpoutSender")
            .field("state", &self.state)
            .field("instance", &self.instance)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Drop for SpoutSender {
    fn drop(&mut self) {
        self.dispose();
    }
}
