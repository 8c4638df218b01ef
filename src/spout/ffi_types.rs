#![expect(unsafe_code, reason = "function pointer reinterpretation of vtable entries")]

//! SpoutLibrary foreign ABI contract.
//!
//! `SpoutLibrary.dll` exports a single C function, `GetSpout()`, returning a
//! pointer to a C++ object. Everything else is reached through that object's
//! vtable. The layout is positional: the first machine word of the object is
//! the address of the table, and each method lives at a fixed index.
//!
//! Indices and signatures are declared together in `spout_slots!`. Changing
//! a signature without touching its index (or the other way round) is not
//! possible without editing the same line.
//!
//! Nothing here can verify that the loaded library matches this table. A
//! mismatch produces wrong calls, not errors.

use std::os::raw::{c_char, c_void};

/// Opaque SpoutLibrary object. Only ever handled through `*mut SpoutInstance`.
#[repr(C)]
pub struct SpoutInstance {
    _private: [u8; 0],
}

/// `DXGI_FORMAT_R8G8B8A8_UNORM`, 8 bits per channel RGBA.
pub const DXGI_FORMAT_R8G8B8A8_UNORM: u32 = 28;

/// `GL_TEXTURE_2D`
pub const GL_TEXTURE_2D: u32 = 0x0DE1;

/// `GL_RGBA`
pub const GL_RGBA: u32 = 0x1908;

/// Wait hint for `ReleaseSender`, in milliseconds.
pub const RELEASE_IMMEDIATELY: u32 = 0;

/// Spout limits sender names to 256 bytes including the terminator.
pub const MAX_SENDER_NAME_LEN: usize = 255;

/// Exported factory symbol.
pub const FACTORY_SYMBOL: &[u8] = b"GetSpout\0";

/// Base name of the shared library, without platform prefix or extension.
pub const LIBRARY_BASE_NAME: &str = "SpoutLibrary";

/// `GetSpout()` signature.
pub type GetSpoutFn = unsafe extern "C" fn() -> *mut SpoutInstance;

// Member functions use thiscall on 32-bit x86. On x86_64 and aarch64 the
// implicit `this` is simply the first C argument. The unwinding variants let
// a Rust panic raised behind the table reach the caller's `catch_unwind`;
// a C++ exception still aborts when it gets there.
#[cfg(target_arch = "x86")]
macro_rules! member_fn {
    (($($arg:ty),*) $(-> $ret:ty)?) => {
        unsafe extern "thiscall-unwind" fn(*mut SpoutInstance $(, $arg)*) $(-> $ret)?
    };
}

#[cfg(not(target_arch = "x86"))]
macro_rules! member_fn {
    (($($arg:ty),*) $(-> $ret:ty)?) => {
        unsafe extern "C-unwind" fn(*mut SpoutInstance $(, $arg)*) $(-> $ret)?
    };
}

/// A positional entry in the SpoutLibrary vtable.
pub trait Slot {
    /// Zero-based position in the table.
    const INDEX: usize;
    /// Method name, for diagnostics.
    const NAME: &'static str;
    /// Foreign function pointer type, `this` included.
    type Fn: Copy;

    /// Reinterpret a raw table entry as this slot's function pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be non-null and point to a function with signature `Self::Fn`.
    unsafe fn from_raw(raw: *const c_void) -> Self::Fn;
}

macro_rules! spout_slots {
    ($($index:literal => $name:ident ($($arg:ty),*) $(-> $ret:ty)?;)*) => {
        $(
            #[doc = concat!("`", stringify!($name), "`, vtable slot ", stringify!($index), ".")]
            #[derive(Debug, Clone, Copy)]
            pub enum $name {}

            impl Slot for $name {
                const INDEX: usize = $index;
                const NAME: &'static str = stringify!($name);
                type Fn = member_fn!(($($arg),*) $(-> $ret)?);

                unsafe fn from_raw(raw: *const c_void) -> Self::Fn {
                    unsafe { std::mem::transmute::<*const c_void, member_fn!(($($arg),*) $(-> $ret)?)>(raw) }
                }
            }
        )*

        /// Number of slots this binding knows about.
        pub const SLOT_COUNT: usize = [$($index),*].len();
    };
}

spout_slots! {
    0 => SetSenderName(*const c_char);
    1 => SetSenderFormat(u32);
    2 => ReleaseSender(u32);
    3 => SendFbo(u32, u32, u32, bool) -> bool;
    4 => SendTexture(u32, u32, u32, u32, bool, u32) -> bool;
    5 => SendImage(*const u8, u32, u32, u32, bool, u32) -> bool;
    6 => IsInitialized() -> bool;
}

// The object's final slot, `Release()`, frees the foreign object. Its index
// depends on the full interface length of the library build, so it is not
// declared. Instances are reclaimed only when the module unloads.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_indices_follow_header_order() {
        assert_eq!(SetSenderName::INDEX, 0);
        assert_eq!(SetSenderFormat::INDEX, 1);
        assert_eq!(ReleaseSender::INDEX, 2);
        assert_eq!(SendFbo::INDEX, 3);
        assert_eq!(SendTexture::INDEX, 4);
        assert_eq!(SendImage::INDEX, 5);
        assert_eq!(IsInitialized::INDEX, 6);
        assert_eq!(SLOT_COUNT, 7);
    }

    #[test]
    fn test_slot_names() {
        assert_eq!(SendTexture::NAME, "SendTexture");
        assert_eq!(IsInitialized::NAME, "IsInitialized");
    }

    #[test]
    fn test_fixed_constants() {
        assert_eq!(DXGI_FORMAT_R8G8B8A8_UNORM, 28);
        assert_eq!(GL_TEXTURE_2D, 0x0DE1);
        assert_eq!(RELEASE_IMMEDIATELY, 0);
        assert_eq!(FACTORY_SYMBOL.last(), Some(&0));
    }
}
