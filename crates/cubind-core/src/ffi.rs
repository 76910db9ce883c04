//! C ABI shared with the native artifact (`native/cubind.h`).

use std::ffi::{c_char, c_int, c_void};
use std::ptr;

// ---------------------------------------------------------------------------
// Shared C types
// ---------------------------------------------------------------------------

/// `gpu_ptr_t`: an opaque, native-owned device resource.
///
/// Deliberately neither `Copy` nor `Clone`: duplicating the pointer without
/// going through `clone_gpu_ptr_t` would lead to a double release.
#[repr(C)]
#[derive(Debug)]
pub struct RawGpuPtr {
    pub ptr: *mut c_void,
}

impl RawGpuPtr {
    pub const fn null() -> Self {
        Self { ptr: ptr::null_mut() }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }
}

/// `Error`: status code plus an optional message allocated by the native side.
///
/// A zero code means success and carries no message. Consumed by value when
/// bridged, so the message pointer cannot be observed after it is released.
#[repr(C)]
#[derive(Debug)]
pub struct NativeError {
    pub code: c_int,
    pub message: *mut c_char,
}

// ---------------------------------------------------------------------------
// Entry point signatures
// ---------------------------------------------------------------------------

pub type FnCloneGpuPtr = unsafe extern "C" fn(*const RawGpuPtr) -> RawGpuPtr;
pub type FnDropGpuPtr = unsafe extern "C" fn(*mut RawGpuPtr);
pub type FnCudaAvailable = unsafe extern "C" fn() -> bool;
pub type FnDropErrorMessage = unsafe extern "C" fn(*mut c_char);

// ---------------------------------------------------------------------------
// Core table
// ---------------------------------------------------------------------------

crate::symbol_table! {
    /// Entry points every artifact built by cubind must export.
    pub struct CoreSymbols {
        clone_gpu_ptr_t: FnCloneGpuPtr,
        drop_gpu_ptr_t: FnDropGpuPtr,
        cuda_available: FnCudaAvailable,
        drop_error_message: FnDropErrorMessage,
    }
}
