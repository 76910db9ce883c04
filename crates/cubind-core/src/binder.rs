//! Opening the artifact and binding the core symbol table.
//!
//! A [`Binder`] goes `Unbound -> Bound` at most once. A failed attempt keeps
//! nothing (the opened library is closed before returning) and can be
//! retried. Once bound, the library stays mapped for the binder's lifetime;
//! the process-wide binder lives in a `static` and is never unloaded.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::error::{LoadError, RuntimeError};
use crate::ffi::{CoreSymbols, NativeError, RawGpuPtr};
use crate::handle::{GpuPtr, HandleOps};
use crate::symbols::{SymbolSource, SymbolTable, Unresolved};

/// A successfully bound artifact.
#[derive(Debug)]
pub struct Bound<L> {
    library: L,
    path: PathBuf,
    symbols: CoreSymbols,
}

impl<L: SymbolSource> Bound<L> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn symbols(&self) -> &CoreSymbols {
        &self.symbols
    }

    /// Availability probe: can the artifact reach a usable GPU?
    pub fn cuda_available(&self) -> bool {
        unsafe { (self.symbols.cuda_available)() }
    }

    /// Convert a failed native call's error into a host error.
    pub fn bridge_error(&self, err: NativeError) -> RuntimeError {
        err.into_runtime_error(self.symbols.drop_error_message)
    }

    /// `Ok(())` for a successful native call, the bridged error otherwise.
    pub fn check(&self, err: NativeError) -> Result<(), RuntimeError> {
        err.into_result(self.symbols.drop_error_message)
    }

    pub fn handle_ops(&self) -> HandleOps {
        HandleOps::from(&self.symbols)
    }

    /// Take ownership of a resource returned by one of this artifact's calls.
    ///
    /// # Safety
    /// `raw` must have been produced by this artifact and not be owned elsewhere.
    pub unsafe fn adopt(&self, raw: RawGpuPtr) -> GpuPtr {
        GpuPtr::from_raw(raw, self.handle_ops())
    }

    /// Resolve an additional table from the same artifact, all or nothing.
    ///
    /// The slot types of `T` must match what the artifact exports.
    pub fn resolve<T: SymbolTable>(&self) -> Result<T, LoadError> {
        unsafe { T::resolve(&self.library) }.map_err(|e| missing(&self.path, e))
    }
}

/// Process-scoped, once-only binding of the core table.
pub struct Binder<L> {
    bound: OnceLock<Bound<L>>,
    lock: Mutex<()>,
}

impl<L> Binder<L> {
    pub const fn new() -> Self {
        Self {
            bound: OnceLock::new(),
            lock: parking_lot::const_mutex(()),
        }
    }

    pub fn get(&self) -> Option<&Bound<L>> {
        self.bound.get()
    }

    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }
}

impl<L> Default for Binder<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: SymbolSource> Binder<L> {
    /// Bind the artifact at `path`, or return the existing binding.
    ///
    /// Once bound, `path` is ignored: there is no reload.
    pub fn bind(&self, path: &Path) -> Result<&Bound<L>, LoadError> {
        if let Some(bound) = self.bound.get() {
            return Ok(bound);
        }

        let _guard = self.lock.lock();
        if let Some(bound) = self.bound.get() {
            return Ok(bound);
        }

        let library = L::open(path).map_err(|message| {
            tracing::debug!(path = %path.display(), %message, "dlopen failed");
            LoadError::Open {
                path: path.to_path_buf(),
                message,
            }
        })?;

        // On failure `library` is dropped here, closing the OS handle.
        let symbols = unsafe { CoreSymbols::resolve(&library) }.map_err(|e| {
            tracing::debug!(path = %path.display(), symbol = e.symbol, "symbol resolution failed");
            missing(path, e)
        })?;

        tracing::info!(path = %path.display(), symbols = CoreSymbols::NAMES.len(), "artifact bound");
        Ok(self.bound.get_or_init(|| Bound {
            library,
            path: path.to_path_buf(),
            symbols,
        }))
    }
}

fn missing(path: &Path, e: Unresolved) -> LoadError {
    LoadError::MissingSymbol {
        path: path.to_path_buf(),
        symbol: e.symbol,
        message: e.message,
    }
}
