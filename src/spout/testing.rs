#![expect(unsafe_code, reason = "stub foreign object exposing a C++-style vtable")]

//! In-process stand-in for a SpoutLibrary object.
//!
//! The stub is laid out the way the real library lays out its object: the
//! first word points at a table of foreign-ABI functions, in header order.
//! Every call is recorded so tests can assert on exact arguments.

use std::{
    cell::{Cell, RefCell},
    ffi::CStr,
    os::raw::{c_char, c_void},
    rc::Rc,
};

use super::{
    error::LoadError,
    ffi_types::{
        IsInitialized, ReleaseSender, SendFbo, SendImage, SendTexture, SetSenderFormat,
        SetSenderName, Slot, SpoutInstance,
    },
    loader::{InstanceFactory, ModuleHandle, ModuleProvider},
};

#[cfg(target_arch = "x86")]
macro_rules! stub_method {
    (fn $name:ident($this:ident $(, $arg:ident: $ty:ty)*) $(-> $ret:ty)? $body:block) => {
        unsafe extern "thiscall-unwind" fn $name($this: *mut SpoutInstance $(, $arg: $ty)*) $(-> $ret)? $body
    };
}

#[cfg(not(target_arch = "x86"))]
macro_rules! stub_method {
    (fn $name:ident($this:ident $(, $arg:ident: $ty:ty)*) $(-> $ret:ty)? $body:block) => {
        unsafe extern "C-unwind" fn $name($this: *mut SpoutInstance $(, $arg: $ty)*) $(-> $ret)? $body
    };
}

/// Seven declared slots plus the trailing `Release()` the binding never calls.
const STUB_TABLE_LEN: usize = 8;

/// One recorded foreign call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StubCall {
    SetSenderName(String),
    SetSenderFormat(u32),
    ReleaseSender(u32),
    SendFbo {
        fbo: u32,
        width: u32,
        height: u32,
        invert: bool,
    },
    SendTexture {
        texture: u32,
        target: u32,
        width: u32,
        height: u32,
        invert: bool,
        host_fbo: u32,
    },
    SendImage {
        len: usize,
        width: u32,
        height: u32,
        format: u32,
        invert: bool,
        host_fbo: u32,
    },
    IsInitialized,
    Release,
}

#[repr(C)]
struct StubObject {
    // Must stay the first field: the binding reads it as the vtable address.
    vtable: *const Cell<*const c_void>,
    table: Box<[Cell<*const c_void>; STUB_TABLE_LEN]>,
    calls: RefCell<Vec<StubCall>>,
    send_result: Cell<bool>,
    // Bit per table index; a set bit makes that method panic before recording.
    faulting: Cell<u32>,
    initialized: Cell<bool>,
}

unsafe fn stub<'a>(this: *mut SpoutInstance) -> &'a StubObject {
    unsafe { &*this.cast::<StubObject>() }
}

stub_method! {
    fn set_sender_name(this, name: *const c_char) {
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
        unsafe { stub(this) }.enter(SetSenderName::INDEX, StubCall::SetSenderName(name));
    }
}

stub_method! {
    fn set_sender_format(this, format: u32) {
        unsafe { stub(this) }.enter(SetSenderFormat::INDEX, StubCall::SetSenderFormat(format));
    }
}

stub_method! {
    fn release_sender(this, wait_ms: u32) {
        let stub = unsafe { stub(this) };
        stub.enter(ReleaseSender::INDEX, StubCall::ReleaseSender(wait_ms));
        stub.initialized.set(false);
    }
}

stub_method! {
    fn send_fbo(this, fbo: u32, width: u32, height: u32, invert: bool) -> bool {
        let stub = unsafe { stub(this) };
        stub.enter(SendFbo::INDEX, StubCall::SendFbo { fbo, width, height, invert });
        stub.finish_send()
    }
}

stub_method! {
    fn send_texture(
        this,
        texture: u32,
        target: u32,
        width: u32,
        height: u32,
        invert: bool,
        host_fbo: u32
    ) -> bool {
        let stub = unsafe { stub(this) };
        let call = StubCall::SendTexture { texture, target, width, height, invert, host_fbo };
        stub.enter(SendTexture::INDEX, call);
        stub.finish_send()
    }
}

stub_method! {
    fn send_image(
        this,
        pixels: *const u8,
        width: u32,
        height: u32,
        format: u32,
        invert: bool,
        host_fbo: u32
    ) -> bool {
        let stub = unsafe { stub(this) };
        let len = if pixels.is_null() { 0 } else { width as usize * height as usize * 4 };
        let call = StubCall::SendImage { len, width, height, format, invert, host_fbo };
        stub.enter(SendImage::INDEX, call);
        stub.finish_send()
    }
}

stub_method! {
    fn is_initialized(this) -> bool {
        let stub = unsafe { stub(this) };
        stub.enter(IsInitialized::INDEX, StubCall::IsInitialized);
        stub.initialized.get()
    }
}

stub_method! {
    fn release(this) {
        unsafe { stub(this) }.enter(STUB_TABLE_LEN - 1, StubCall::Release);
    }
}

impl StubObject {
    fn enter(&self, index: usize, call: StubCall) {
        if self.faulting.get() & (1 << index) != 0 {
            panic!("stub fault in slot {index}");
        }
        self.calls.borrow_mut().push(call);
    }

    fn finish_send(&self) -> bool {
        let ok = self.send_result.get();
        if ok {
            self.initialized.set(true);
        }
        ok
    }
}

/// Shared handle to a stub object. Clones refer to the same object.
#[derive(Clone)]
pub(crate) struct StubSpout(Rc<StubObject>);

impl StubSpout {
    pub(crate) fn new() -> Self {
        let entries: [*const c_void; STUB_TABLE_LEN] = [
            set_sender_name as *const c_void,
            set_sender_format as *const c_void,
            release_sender as *const c_void,
            send_fbo as *const c_void,
            send_texture as *const c_void,
            send_image as *const c_void,
            is_initialized as *const c_void,
            release as *const c_void,
        ];
        let table = Box::new(entries.map(Cell::new));
        Self(Rc::new(StubObject {
            vtable: table.as_ptr(),
            table,
            calls: RefCell::new(Vec::new()),
            send_result: Cell::new(true),
            faulting: Cell::new(0),
            initialized: Cell::new(false),
        }))
    }

    pub(crate) fn as_ptr(&self) -> *mut SpoutInstance {
        Rc::as_ptr(&self.0).cast::<SpoutInstance>().cast_mut()
    }

    /// Null out one table entry.
    pub(crate) fn clear_slot(&self, index: usize) {
        self.0.table[index].set(std::ptr::null());
    }

    pub(crate) fn set_send_result(&self, ok: bool) {
        self.0.send_result.set(ok);
    }

    /// Make the method at `index` panic instead of running.
    pub(crate) fn fault_slot(&self, index: usize) {
        self.0.faulting.set(self.0.faulting.get() | (1 << index));
    }

    pub(crate) fn calls(&self) -> Vec<StubCall> {
        self.0.calls.borrow().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.0.calls.borrow_mut().clear();
    }
}

/// Factory handing out one stub instance, or null.
pub(crate) struct StubFactory {
    stub: Option<StubSpout>,
    created: Rc<Cell<usize>>,
}

impl InstanceFactory for StubFactory {
    fn create_instance(&self) -> *mut SpoutInstance {
        self.created.set(self.created.get() + 1);
        self.stub
            .as_ref()
            .map_or(std::ptr::null_mut(), StubSpout::as_ptr)
    }

    fn origin(&self) -> &str {
        "stub"
    }
}

/// Provider that either "loads" a stub module or fails with a fixed code.
pub(crate) struct StubProvider {
    stub: Option<StubSpout>,
    fail_code: Option<i32>,
    pub(crate) loads: Rc<Cell<usize>>,
    pub(crate) created: Rc<Cell<usize>>,
}

impl StubProvider {
    /// A module whose factory returns `stub`.
    pub(crate) fn with_instance(stub: &StubSpout) -> Self {
        Self {
            stub: Some(stub.clone()),
            fail_code: None,
            loads: Rc::default(),
            created: Rc::default(),
        }
    }

    /// A module whose factory returns null.
    pub(crate) fn null_factory() -> Self {
        Self {
            stub: None,
            fail_code: None,
            loads: Rc::default(),
            created: Rc::default(),
        }
    }

    /// A module that cannot be loaded.
    pub(crate) fn missing(code: i32) -> Self {
        Self {
            stub: None,
            fail_code: Some(code),
            loads: Rc::default(),
            created: Rc::default(),
        }
    }
}

impl ModuleProvider for StubProvider {
    fn load(&self, library: &str) -> Result<ModuleHandle, LoadError> {
        self.loads.set(self.loads.get() + 1);
        if let Some(code) = self.fail_code {
            return Err(LoadError {
                library: library.to_string(),
                code: Some(code),
                message: "stub module unavailable".to_string(),
            });
        }
        Ok(ModuleHandle::new(StubFactory {
            stub: self.stub.clone(),
            created: Rc::clone(&self.created),
        }))
    }
}
