//! # cubind
//!
//! Runtime binding for CUDA modules that are not linked at build time.
//!
//! On first use a `.cu` source is compiled with nvcc into a shared library
//! next to the executable, opened with the dynamic loader, and a fixed table
//! of entry points is resolved from it. The CUDA toolchain only has to exist
//! where the module is first built, not where the host binary is compiled.
//!
//! Provides:
//! - Artifact staleness check (rebuild only when the source changed)
//! - Build orchestration over `cc`/`nvcc`, with optional `sccache`
//! - All-or-nothing symbol binding into typed function-pointer tables
//! - Native error bridging with single-release message ownership
//! - Owned device resource handles with native clone/drop
//!
//! ```ignore
//! let bound = cubind::load!("src/msm", "-arch=sm_80")?;
//! if bound.cuda_available() {
//!     let msm: MsmSymbols = bound.resolve()?;
//!     bound.check(unsafe { (msm.mult_pippenger)(/* ... */) })?;
//! }
//! ```

pub mod symbols;
pub mod ffi;
pub mod error;
pub mod config;
pub mod cache;
pub mod build;
mod bridge;
pub mod handle;
pub mod binder;
pub mod loader;
pub mod export;

#[cfg(test)]
mod testing;

pub use binder::{Binder, Bound};
pub use build::{ArtifactBuilder, BuildRequest, NvccBuilder};
pub use config::BuildConfig;
pub use error::{BuildError, CubindError, HandleError, LoadError, Result, RuntimeError};
pub use export::{export, export_artifacts};
pub use ffi::{CoreSymbols, NativeError, RawGpuPtr};
pub use handle::{GpuPtr, HandleOps};
pub use loader::{bind, bound, is_cuda_available, load, LoadRequest, Loader};
pub use symbols::{SymbolSource, SymbolTable};
