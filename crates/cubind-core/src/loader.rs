//! "Ensure module X is available": cache check, build, bind.
//!
//! ```text
//! ensure(request)
//!   ├─ already bound? ──────────────────────────────► done
//!   ├─ needs_rebuild(src, dst)?
//!   │     no ─► bind(dst) ── ok ────────────────────► done
//!   │                     └─ err ─┐
//!   │     yes ────────────────────┤
//!   ├─ build(dst, src, args) ── err ─► BuildError (fatal)
//!   └─ bind(dst) ───────────── err ─► LoadError  (fatal)
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libloading::Library;
use parking_lot::Mutex;

use crate::binder::{Binder, Bound};
use crate::build::{ArtifactBuilder, BuildRequest, NvccBuilder};
use crate::cache;
use crate::config::BuildConfig;
use crate::error::{CubindError, Result};
use crate::symbols::SymbolSource;

/// Extension of CUDA kernel sources.
pub const SOURCE_EXTENSION: &str = "cu";

/// Which module to make available, and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    base_name: String,
    source_dir: PathBuf,
    artifact_dir: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl LoadRequest {
    /// `base_name` may carry an extension (`"msm.cu"`), which is dropped, and
    /// a relative directory (`"src/msm"`), which applies to the source only.
    pub fn new(base_name: impl AsRef<str>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_name: trim_extension(base_name.as_ref()).to_string(),
            source_dir: source_dir.into(),
            artifact_dir: None,
            extra_args: Vec::new(),
        }
    }

    /// Place the artifact here instead of next to the executable.
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Extra argument for the accelerator compiler.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// `<source_dir>/<base_name>.cu`
    pub fn source_path(&self) -> PathBuf {
        self.source_dir
            .join(format!("{}.{SOURCE_EXTENSION}", self.base_name))
    }

    /// `<artifact_dir>/<file name of base_name>.<DLL_EXTENSION>`
    pub fn artifact_path(&self) -> Result<PathBuf> {
        let dir = match &self.artifact_dir {
            Some(dir) => dir.clone(),
            None => executable_dir()?,
        };
        let stem = Path::new(&self.base_name)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.base_name.clone());
        Ok(dir.join(format!("{stem}.{}", env::consts::DLL_EXTENSION)))
    }
}

fn trim_extension(name: &str) -> &str {
    match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => name.strip_suffix(ext).and_then(|s| s.strip_suffix('.')).unwrap_or(name),
        None => name,
    }
}

/// Directory of the running executable, where artifacts are placed.
pub fn executable_dir() -> Result<PathBuf> {
    let exe = env::current_exe()?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Only x86_64 and aarch64 hosts have a CUDA toolchain to build with.
pub fn check_arch(arch: &'static str) -> Result<()> {
    match arch {
        "x86_64" | "aarch64" => Ok(()),
        other => Err(CubindError::UnsupportedArch(other)),
    }
}

/// Drives the build/bind sequence for one binder.
pub struct Loader<B, L> {
    builder: B,
    binder: Binder<L>,
    sequence: Mutex<()>,
}

impl<B: ArtifactBuilder, L: SymbolSource> Loader<B, L> {
    pub fn new(builder: B) -> Self {
        Self {
            builder,
            binder: Binder::new(),
            sequence: Mutex::new(()),
        }
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn binder(&self) -> &Binder<L> {
        &self.binder
    }

    /// Make the requested module available, building it if needed.
    ///
    /// Once anything is bound, every later call returns that binding without
    /// touching the filesystem or the toolchain.
    pub fn ensure(&self, request: &LoadRequest) -> Result<&Bound<L>> {
        check_arch(env::consts::ARCH)?;

        if let Some(bound) = self.binder.get() {
            return Ok(bound);
        }

        // Concurrent first calls would otherwise build the same artifact twice.
        let _guard = self.sequence.lock();
        if let Some(bound) = self.binder.get() {
            return Ok(bound);
        }

        let source = request.source_path();
        let artifact = request.artifact_path()?;

        if !cache::needs_rebuild(&source, &artifact) {
            match self.binder.bind(&artifact) {
                Ok(bound) => return Ok(bound),
                Err(e) => tracing::warn!("{e}; rebuilding"),
            }
        }

        self.builder.build(&BuildRequest {
            destination: artifact.clone(),
            source,
            extra_args: request.extra_args.clone(),
        })?;

        Ok(self.binder.bind(&artifact)?)
    }
}

static GLOBAL: OnceLock<Loader<NvccBuilder, Library>> = OnceLock::new();

fn global() -> &'static Loader<NvccBuilder, Library> {
    GLOBAL.get_or_init(|| Loader::new(NvccBuilder::new(BuildConfig::from_env())))
}

/// Make `request` available in this process using the CUDA toolchain
/// configured by the environment.
pub fn load(request: &LoadRequest) -> Result<&'static Bound<Library>> {
    global().ensure(request)
}

/// Bind an already built artifact without involving the toolchain.
pub fn bind(path: &Path) -> Result<&'static Bound<Library>> {
    Ok(global().binder().bind(path)?)
}

/// The process-wide binding, if one exists.
pub fn bound() -> Option<&'static Bound<Library>> {
    GLOBAL.get().and_then(|loader| loader.binder().get())
}

/// Whether the bound artifact can reach a usable GPU.
pub fn is_cuda_available() -> Result<bool> {
    bound().map(Bound::cuda_available).ok_or(CubindError::NotLoaded)
}

/// Load a module whose `.cu` source sits in the calling crate's directory.
///
/// ```ignore
/// let bound = cubind::load!("src/msm", "-arch=sm_80")?;
/// ```
#[macro_export]
macro_rules! load {
    ($base:expr $(, $arg:expr)* $(,)?) => {
        $crate::load(
            &$crate::LoadRequest::new($base, env!("CARGO_MANIFEST_DIR"))
                $(.arg($arg))*
        )
    };
}
