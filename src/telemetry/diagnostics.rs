//! Startup diagnostics.

use tracing::{debug, info};

use crate::spout::ffi_types::LIBRARY_BASE_NAME;

/// Facts about the process relevant to the Spout binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    /// `std::env::consts::OS`
    pub os: &'static str,
    /// `std::env::consts::ARCH`
    pub arch: &'static str,
    /// Bits per pointer, which is also the vtable stride.
    pub pointer_width: usize,
    /// Calling convention used for vtable methods.
    pub member_abi: &'static str,
    /// Platform file name of the library.
    pub library_file: String,
}

impl SystemInfo {
    /// Gather info for the running process.
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            pointer_width: std::mem::size_of::<usize>() * 8,
            member_abi: if cfg!(target_arch = "x86") {
                "thiscall"
            } else {
                "C"
            },
            library_file: libloading::library_filename(LIBRARY_BASE_NAME)
                .to_string_lossy()
                .into_owned(),
        }
    }
}

/// Log the environment at startup.
pub fn log_startup_diagnostics() {
    let info = SystemInfo::collect();
    info!(
        "Platform: {} {} ({}-bit)",
        info.os, info.arch, info.pointer_width
    );
    info!("Library file: {}", info.library_file);
    debug!("vtable member ABI: {}", info.member_abi);
    if info.os != "windows" {
        info!("Spout receivers are Windows-only; sending requires a compatible library build");
    }
}
