//! Statically declared symbol tables and the sources they resolve from.
//!
//! A table is a plain struct of typed `extern "C"` function pointers. The
//! [`symbol_table!`](crate::symbol_table) macro generates the struct together
//! with the ordered list of exported names, and a `resolve` that either fills
//! every slot or fails. There is no way to hold a half-resolved table.

use std::ffi::c_void;
use std::mem;
use std::path::Path;

use libloading::Library;

// ---------------------------------------------------------------------------
// Symbol sources
// ---------------------------------------------------------------------------

/// Something symbols can be looked up in: an opened shared library in
/// production, an in-memory fake in tests.
pub trait SymbolSource: Sized {
    /// Open the artifact at `path`. The error is the loader's own message.
    fn open(path: &Path) -> Result<Self, String>;

    /// Address of the exported symbol `name`.
    fn address(&self, name: &str) -> Result<*mut c_void, String>;
}

impl SymbolSource for Library {
    #[cfg(unix)]
    fn open(path: &Path) -> Result<Self, String> {
        use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

        // Resolve everything up front; RTLD_GLOBAL lets sibling artifacts see
        // the CUDA runtime this one pulled in.
        unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }
            .map(Library::from)
            .map_err(|e| e.to_string())
    }

    #[cfg(not(unix))]
    fn open(path: &Path) -> Result<Self, String> {
        unsafe { Library::new(path) }.map_err(|e| e.to_string())
    }

    fn address(&self, name: &str) -> Result<*mut c_void, String> {
        let symbol = unsafe { self.get::<*mut c_void>(name.as_bytes()) }
            .map_err(|e| e.to_string())?;
        Ok(*symbol)
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// A symbol that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub symbol: &'static str,
    pub message: String,
}

/// A fixed set of native entry points resolved as a unit.
pub trait SymbolTable: Sized + Copy {
    /// Exported names, in declaration order.
    const NAMES: &'static [&'static str];

    /// Resolve every slot from `source`.
    ///
    /// # Safety
    /// Each slot type must match the calling convention and signature of the
    /// symbol the artifact exports under that name.
    unsafe fn resolve<S: SymbolSource>(source: &S) -> Result<Self, Unresolved>;
}

/// Look up `name` and reinterpret its address as the slot type `F`.
///
/// # Safety
/// `F` must be a function pointer type matching the exported symbol.
#[doc(hidden)]
pub unsafe fn slot<S: SymbolSource, F: Copy>(
    source: &S,
    name: &'static str,
) -> Result<F, Unresolved> {
    if mem::size_of::<F>() != mem::size_of::<*mut c_void>() {
        return Err(Unresolved {
            symbol: name,
            message: format!("slot type is not pointer-sized ({} bytes)", mem::size_of::<F>()),
        });
    }
    let address = source
        .address(name)
        .map_err(|message| Unresolved { symbol: name, message })?;
    if address.is_null() {
        return Err(Unresolved {
            symbol: name,
            message: "symbol resolved to a null address".to_string(),
        });
    }
    tracing::trace!(symbol = name, ?address, "resolved");
    Ok(mem::transmute_copy::<*mut c_void, F>(&address))
}

// ---------------------------------------------------------------------------
// Declaration macro
// ---------------------------------------------------------------------------

/// Declare a table of native entry points.
///
/// Field names are the exported symbol names; field types are the matching
/// `unsafe extern "C" fn` pointer types.
///
/// ```ignore
/// cubind::symbol_table! {
///     pub struct MsmSymbols {
///         mult_pippenger: unsafe extern "C" fn(*mut Point, *const Point, usize, *const Scalar) -> NativeError,
///     }
/// }
///
/// let msm: MsmSymbols = cubind::load!("msm")?.resolve()?;
/// ```
#[macro_export]
macro_rules! symbol_table {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$field_meta:meta])* $field:ident : $ty:ty ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name {
            $( $(#[$field_meta])* pub $field: $ty, )+
        }

        impl $crate::symbols::SymbolTable for $name {
            const NAMES: &'static [&'static str] = &[$(stringify!($field)),+];

            unsafe fn resolve<S: $crate::symbols::SymbolSource>(
                source: &S,
            ) -> ::std::result::Result<Self, $crate::symbols::Unresolved> {
                Ok(Self {
                    $( $field: $crate::symbols::slot::<S, $ty>(source, stringify!($field))?, )+
                })
            }
        }
    };
}
