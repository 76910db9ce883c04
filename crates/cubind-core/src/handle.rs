//! Owned native device resources.
//!
//! A [`GpuPtr`] exclusively owns one `gpu_ptr_t`. Cloning asks the native
//! side for an independent resource; dropping releases it and leaves the
//! handle empty. There is no reference counting.

use std::fmt;
use std::mem::ManuallyDrop;

use crate::error::HandleError;
use crate::ffi::{CoreSymbols, FnCloneGpuPtr, FnDropGpuPtr, RawGpuPtr};

/// The two lifecycle entry points a handle needs, copied out of the bound table.
#[derive(Debug, Clone, Copy)]
pub struct HandleOps {
    clone: FnCloneGpuPtr,
    drop: FnDropGpuPtr,
}

impl HandleOps {
    pub fn new(clone: FnCloneGpuPtr, drop: FnDropGpuPtr) -> Self {
        Self { clone, drop }
    }
}

impl From<&CoreSymbols> for HandleOps {
    fn from(symbols: &CoreSymbols) -> Self {
        Self::new(symbols.clone_gpu_ptr_t, symbols.drop_gpu_ptr_t)
    }
}

/// A native device resource owned by the host.
pub struct GpuPtr {
    raw: RawGpuPtr,
    ops: HandleOps,
}

// Ownership is exclusive, so moving a handle to another thread is fine.
// Shared access is not: `try_clone` would race with `release`.
unsafe impl Send for GpuPtr {}

impl GpuPtr {
    /// Take ownership of a resource returned by a native call.
    ///
    /// # Safety
    /// `raw` must come from the artifact `ops` were resolved from, and no one
    /// else may release it.
    pub unsafe fn from_raw(raw: RawGpuPtr, ops: HandleOps) -> Self {
        Self { raw, ops }
    }

    /// A handle that owns nothing.
    pub fn empty(ops: HandleOps) -> Self {
        Self { raw: RawGpuPtr::null(), ops }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_null()
    }

    /// Borrow the raw value to pass it into a native call.
    pub fn as_raw(&self) -> &RawGpuPtr {
        &self.raw
    }

    /// Mutable access for native calls that fill the handle in place.
    pub fn as_raw_mut(&mut self) -> &mut RawGpuPtr {
        &mut self.raw
    }

    /// Give up ownership without releasing.
    pub fn into_raw(self) -> RawGpuPtr {
        let this = ManuallyDrop::new(self);
        RawGpuPtr { ptr: this.raw.ptr }
    }

    /// Ask the native side for an independent copy of this resource.
    ///
    /// An empty handle clones to an empty handle without a native call.
    pub fn try_clone(&self) -> Result<Self, HandleError> {
        if self.is_empty() {
            return Ok(Self::empty(self.ops));
        }
        let raw = unsafe { (self.ops.clone)(&self.raw) };
        if raw.is_null() {
            return Err(HandleError::CloneFailed);
        }
        Ok(Self { raw, ops: self.ops })
    }

    /// Release the resource now. A second call is a no-op.
    pub fn release(&mut self) {
        if self.raw.is_null() {
            return;
        }
        unsafe { (self.ops.drop)(&mut self.raw) };
        self.raw = RawGpuPtr::null();
    }
}

impl Clone for GpuPtr {
    /// # Panics
    /// If the device is out of memory, like any other failed allocation.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(handle) => handle,
            Err(e) => panic!("{e}"),
        }
    }
}

impl Drop for GpuPtr {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for GpuPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GpuPtr").field(&self.raw.ptr).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, alloc_device_value, device_value, fake_symbols};

    fn ops() -> HandleOps {
        HandleOps::from(&fake_symbols())
    }

    fn handle(value: u64) -> GpuPtr {
        unsafe { GpuPtr::from_raw(alloc_device_value(value), ops()) }
    }

    #[test]
    fn test_clone_is_independent_of_original() {
        let original = handle(7);
        let mut copy = original.clone();
        assert_ne!(original.as_raw().ptr, copy.as_raw().ptr);

        copy.release();
        assert!(copy.is_empty());
        assert!(!original.is_empty());
        assert_eq!(unsafe { device_value(original.as_raw()) }, 7);
    }

    #[test]
    fn test_double_release_calls_native_once() {
        let before = testing::releases();
        let mut h = handle(1);
        h.release();
        h.release();
        drop(h);
        assert_eq!(testing::releases() - before, 1);
    }

    #[test]
    fn test_drop_releases() {
        let before = testing::releases();
        {
            let _h = handle(3);
        }
        assert_eq!(testing::releases() - before, 1);
    }

    #[test]
    fn test_empty_handle_never_reaches_native() {
        let clones = testing::clones();
        let releases = testing::releases();

        let mut empty = GpuPtr::empty(ops());
        let copy = empty.try_clone().unwrap();
        assert!(copy.is_empty());
        empty.release();
        drop(copy);

        assert_eq!(testing::clones(), clones);
        assert_eq!(testing::releases(), releases);
    }

    #[test]
    fn test_clone_failure_is_reported() {
        let h = handle(5);
        let result = {
            let _fail = testing::FailClones::arm();
            h.try_clone()
        };
        assert_eq!(result.unwrap_err(), HandleError::CloneFailed);
        assert!(!h.is_empty());
    }

    #[test]
    #[should_panic(expected = "allocation failed")]
    fn test_clone_panics_on_allocation_failure() {
        let h = handle(5);
        let _fail = testing::FailClones::arm();
        let _ = h.clone();
    }

    #[test]
    fn test_into_raw_skips_release() {
        let before = testing::releases();
        let raw = handle(11).into_raw();
        assert_eq!(testing::releases(), before);
        // Hand it back so the fake allocation is freed.
        drop(unsafe { GpuPtr::from_raw(raw, ops()) });
        assert_eq!(testing::releases() - before, 1);
    }
}
