#![expect(
    unsafe_code,
    reason = "dlopen/LoadLibrary, symbol lookup and the GetSpout factory call"
)]

//! SpoutLibrary loading.
//!
//! Makes the shared library resident, resolves `GetSpout()` and hands out a
//! [`ModuleHandle`]. Senders hold a clone of the handle, so the library stays
//! mapped for as long as any sender can still call into it.

use std::{
    ffi::OsString,
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, error, info};

use super::{
    error::{LoadError, SenderError},
    ffi_types::{GetSpoutFn, SpoutInstance, FACTORY_SYMBOL, LIBRARY_BASE_NAME},
};
use crate::config::types::LibraryConfig;

/// Environment override for the library location.
pub const LIBRARY_PATH_ENV: &str = "SPOUT_LIBRARY_PATH";

/// Source of SpoutLibrary instances.
pub trait InstanceFactory {
    /// Call the library's factory. May return null.
    fn create_instance(&self) -> *mut SpoutInstance;

    /// Where the factory came from, for diagnostics.
    fn origin(&self) -> &str;
}

/// A loaded SpoutLibrary with its resolved factory.
pub struct NativeModule {
    path: String,
    get_spout: GetSpoutFn,
    _library: libloading::Library,
}

impl InstanceFactory for NativeModule {
    fn create_instance(&self) -> *mut SpoutInstance {
        // Safety: `get_spout` was resolved from `_library`, which outlives it.
        unsafe { (self.get_spout)() }
    }

    fn origin(&self) -> &str {
        &self.path
    }
}

/// Proof that SpoutLibrary is resident. Cheap to clone.
#[derive(Clone)]
pub struct ModuleHandle(Arc<dyn InstanceFactory>);

impl ModuleHandle {
    /// Wrap a factory in a handle.
    pub fn new(factory: impl InstanceFactory + 'static) -> Self {
        Self(Arc::new(factory))
    }

    /// Where the module was loaded from.
    pub fn origin(&self) -> &str {
        self.0.origin()
    }

    pub(crate) fn create_instance(&self) -> *mut SpoutInstance {
        self.0.create_instance()
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleHandle").field(&self.origin()).finish()
    }
}

/// Loads a module by name.
pub trait ModuleProvider {
    /// Make `library` resident and return a handle to it.
    fn load(&self, library: &str) -> Result<ModuleHandle, LoadError>;
}

/// Production provider backed by `libloading`.
///
/// Search order:
/// 1. `SPOUT_LIBRARY_PATH` environment variable
/// 2. Configured explicit path
/// 3. Configured search directories
/// 4. The platform file name, resolved by the OS loader
#[derive(Debug, Clone, Default)]
pub struct LibraryLoader {
    explicit_path: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl LibraryLoader {
    /// Loader that only asks the OS loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader driven by the `[library]` config section.
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self {
            explicit_path: config.path.clone(),
            search_dirs: config.search_dirs.clone(),
        }
    }

    /// Candidate locations for `library`, in the order they are tried.
    pub fn candidates(&self, library: &str) -> Vec<OsString> {
        let file_name = libloading::library_filename(library);
        let mut candidates = Vec::new();

        if let Some(path) = std::env::var_os(LIBRARY_PATH_ENV) {
            if !path.is_empty() {
                candidates.push(path);
            }
        }
        if let Some(path) = &self.explicit_path {
            candidates.push(path.clone().into_os_string());
        }
        for dir in &self.search_dirs {
            candidates.push(dir.join(&file_name).into_os_string());
        }
        candidates.push(file_name);
        candidates
    }
}

impl ModuleProvider for LibraryLoader {
    fn load(&self, library: &str) -> Result<ModuleHandle, LoadError> {
        let mut last_error = None;
        for candidate in self.candidates(library) {
            let shown = Path::new(&candidate).display().to_string();
            match try_load(&candidate) {
                Ok(module) => return Ok(ModuleHandle::new(module)),
                Err(e) => {
                    debug!("Tried {shown}: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| LoadError {
            library: library.to_string(),
            code: None,
            message: "no candidate locations".to_string(),
        }))
    }
}

/// Load one candidate path and resolve the factory symbol.
fn try_load(candidate: &OsString) -> Result<NativeModule, LoadError> {
    let path = Path::new(candidate).display().to_string();

    // Safety: SpoutLibrary has no load-time initialisation with preconditions
    // beyond a normal DLL.
    let library = unsafe { libloading::Library::new(candidate) }.map_err(|e| LoadError {
        library: path.clone(),
        code: platform_error_code(&e),
        message: e.to_string(),
    })?;

    let get_spout: libloading::Symbol<'_, GetSpoutFn> =
        unsafe { library.get(FACTORY_SYMBOL) }.map_err(|e| LoadError {
            library: path.clone(),
            code: platform_error_code(&e),
            message: format!("symbol GetSpout: {e}"),
        })?;
    let get_spout = *get_spout;

    Ok(NativeModule {
        path,
        get_spout,
        _library: library,
    })
}

/// OS error code behind a loader error.
///
/// On Windows libloading keeps the `LoadLibraryExW` / `GetProcAddress`
/// failure as an `io::Error` source. `dlerror` failures carry no code.
fn platform_error_code(err: &(dyn std::error::Error + 'static)) -> Option<i32> {
    std::iter::successors(Some(err), |e| e.source())
        .find_map(|e| e.downcast_ref::<io::Error>().and_then(io::Error::raw_os_error))
}

/// Keeps SpoutLibrary resident for the process.
///
/// The first successful load is cached; later calls return the same handle.
/// A failed load is recorded and retried on the next call.
pub struct ModuleResidency {
    library: String,
    provider: Box<dyn ModuleProvider>,
    module: Option<ModuleHandle>,
    last_error: Option<LoadError>,
}

impl ModuleResidency {
    /// Residency for `library`, loaded through `provider`.
    pub fn new(library: impl Into<String>, provider: impl ModuleProvider + 'static) -> Self {
        Self {
            library: library.into(),
            provider: Box::new(provider),
            module: None,
            last_error: None,
        }
    }

    /// Residency for the configured library, loaded with [`LibraryLoader`].
    pub fn from_config(config: &LibraryConfig) -> Self {
        let library = if config.name.is_empty() {
            LIBRARY_BASE_NAME.to_string()
        } else {
            config.name.clone()
        };
        Self::new(library, LibraryLoader::from_config(config))
    }

    /// Make the library resident. Returns false on failure.
    pub fn ensure_loaded(&mut self) -> bool {
        self.try_ensure_loaded().is_ok()
    }

    /// Make the library resident, returning the handle or the load failure.
    pub fn try_ensure_loaded(&mut self) -> Result<ModuleHandle, SenderError> {
        if let Some(module) = &self.module {
            return Ok(module.clone());
        }

        match self.provider.load(&self.library) {
            Ok(module) => {
                info!("{} loaded from {}", self.library, module.origin());
                self.last_error = None;
                self.module = Some(module.clone());
                Ok(module)
            }
            Err(e) => {
                match e.code {
                    Some(code) => error!("Failed to load {}. Error code: {code}", self.library),
                    None => error!("Failed to load {}: {e}", self.library),
                }
                self.last_error = Some(e.clone());
                Err(SenderError::Load(e))
            }
        }
    }

    /// Handle to the resident module, if loaded.
    pub fn handle(&self) -> Option<ModuleHandle> {
        self.module.clone()
    }

    /// True once a load has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.module.is_some()
    }

    /// The most recent load failure, cleared by a later success.
    pub fn last_error(&self) -> Option<&LoadError> {
        self.last_error.as_ref()
    }

    /// Library name this residency loads.
    pub fn library(&self) -> &str {
        &self.library
    }
}

impl fmt::Debug for ModuleResidency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleResidency")
            .field("library", &self.library)
            .field("module", &self.module)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
