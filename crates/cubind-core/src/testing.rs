//! In-process fake of the native artifact.
//!
//! A fake "artifact" is a text file listing the symbols it exports, one per
//! line. `FakeLibrary::open` reads it and maps each name to a Rust
//! `extern "C"` function below. Counters are thread-local so parallel tests
//! do not see each other's calls.

use std::cell::Cell;
use std::ffi::{c_char, c_void, CString};
use std::fs;
use std::path::Path;

use crate::ffi::{CoreSymbols, RawGpuPtr};
use crate::symbols::{SymbolSource, SymbolTable};

thread_local! {
    static OPENS: Cell<usize> = const { Cell::new(0) };
    static CLOSES: Cell<usize> = const { Cell::new(0) };
    static CLONES: Cell<usize> = const { Cell::new(0) };
    static RELEASES: Cell<usize> = const { Cell::new(0) };
    static MESSAGE_DROPS: Cell<usize> = const { Cell::new(0) };
    static FAIL_CLONE: Cell<bool> = const { Cell::new(false) };
}

fn bump(counter: &'static std::thread::LocalKey<Cell<usize>>) {
    counter.with(|c| c.set(c.get() + 1));
}

pub fn opens() -> usize {
    OPENS.with(Cell::get)
}

pub fn closes() -> usize {
    CLOSES.with(Cell::get)
}

pub fn clones() -> usize {
    CLONES.with(Cell::get)
}

pub fn releases() -> usize {
    RELEASES.with(Cell::get)
}

pub fn message_drops() -> usize {
    MESSAGE_DROPS.with(Cell::get)
}

/// Makes the fake `clone_gpu_ptr_t` report allocation failure until dropped.
pub struct FailClones(());

impl FailClones {
    pub fn arm() -> Self {
        FAIL_CLONE.with(|f| f.set(true));
        Self(())
    }
}

impl Drop for FailClones {
    fn drop(&mut self) {
        FAIL_CLONE.with(|f| f.set(false));
    }
}

/// Allocate a device resource the way the native side would.
pub fn alloc_device_value(value: u64) -> RawGpuPtr {
    RawGpuPtr { ptr: Box::into_raw(Box::new(value)) as *mut c_void }
}

/// Read the value behind a fake device resource.
pub unsafe fn device_value(raw: &RawGpuPtr) -> u64 {
    *(raw.ptr as *const u64)
}

/// Allocate an error message the way the native side would.
pub fn alloc_message(text: &str) -> *mut c_char {
    CString::new(text).unwrap().into_raw()
}

pub unsafe extern "C" fn fake_clone_gpu_ptr_t(src: *const RawGpuPtr) -> RawGpuPtr {
    bump(&CLONES);
    if FAIL_CLONE.with(Cell::get) || src.is_null() || (*src).is_null() {
        return RawGpuPtr::null();
    }
    alloc_device_value(device_value(&*src))
}

pub unsafe extern "C" fn fake_drop_gpu_ptr_t(ptr: *mut RawGpuPtr) {
    bump(&RELEASES);
    if !(*ptr).is_null() {
        drop(Box::from_raw((*ptr).ptr as *mut u64));
        (*ptr).ptr = std::ptr::null_mut();
    }
}

pub unsafe extern "C" fn fake_cuda_available() -> bool {
    false
}

pub unsafe extern "C" fn fake_drop_error_message(message: *mut c_char) {
    bump(&MESSAGE_DROPS);
    drop(CString::from_raw(message));
}

pub fn fake_symbols() -> CoreSymbols {
    CoreSymbols {
        clone_gpu_ptr_t: fake_clone_gpu_ptr_t,
        drop_gpu_ptr_t: fake_drop_gpu_ptr_t,
        cuda_available: fake_cuda_available,
        drop_error_message: fake_drop_error_message,
    }
}

fn fake_address(name: &str) -> Option<*mut c_void> {
    let symbols = fake_symbols();
    let address = match name {
        "clone_gpu_ptr_t" => symbols.clone_gpu_ptr_t as *mut c_void,
        "drop_gpu_ptr_t" => symbols.drop_gpu_ptr_t as *mut c_void,
        "cuda_available" => symbols.cuda_available as *mut c_void,
        "drop_error_message" => symbols.drop_error_message as *mut c_void,
        _ => return None,
    };
    Some(address)
}

/// Write a fake artifact exporting `symbols`.
pub fn write_artifact(path: &Path, symbols: &[&str]) {
    fs::write(path, symbols.join("\n")).unwrap();
}

/// Write a fake artifact exporting the full core table.
pub fn write_complete_artifact(path: &Path) {
    write_artifact(path, CoreSymbols::NAMES);
}

#[derive(Debug)]
pub struct FakeLibrary {
    exported: Vec<String>,
}

impl SymbolSource for FakeLibrary {
    fn open(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("{}: cannot open shared object file: {e}", path.display()))?;
        bump(&OPENS);
        Ok(Self {
            exported: text.lines().map(str::to_string).collect(),
        })
    }

    fn address(&self, name: &str) -> Result<*mut c_void, String> {
        if !self.exported.iter().any(|n| n == name) {
            return Err(format!("undefined symbol: {name}"));
        }
        fake_address(name).ok_or_else(|| format!("no fake implementation for {name}"))
    }
}

impl Drop for FakeLibrary {
    fn drop(&mut self) {
        bump(&CLOSES);
    }
}
