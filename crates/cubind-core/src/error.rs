//! Error taxonomy for the build/load/bridge pipeline.
//!
//! Build and load failures abort the load request that hit them. Runtime
//! errors come from bridged native calls and belong to the immediate caller.

use std::io;
use std::path::PathBuf;

/// The external toolchain could not produce the artifact.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}\n{output}")]
    Failed {
        command: String,
        status: String,
        output: String,
    },

    #[error("failed to prepare build scratch directory: {0}")]
    Scratch(#[source] io::Error),
}

impl BuildError {
    /// Combined stdout/stderr of the failing step, if it got that far.
    pub fn output(&self) -> Option<&str> {
        match self {
            BuildError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// The dynamic loader rejected the artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {}: {message}", .path.display())]
    Open { path: PathBuf, message: String },

    #[error("symbol `{symbol}` not found in {}: {message}", .path.display())]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        message: String,
    },
}

/// A failure reported by a bridged native call, copied into host memory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("native error {code}: {message}")]
pub struct RuntimeError {
    pub code: i32,
    pub message: String,
}

/// Resource handle lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("native clone_gpu_ptr_t returned an empty handle (device allocation failed)")]
    CloneFailed,
}

/// Top-level error for everything `cubind` does.
#[derive(Debug, thiserror::Error)]
pub enum CubindError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error("{0}: unsupported architecture (expected x86_64 or aarch64)")]
    UnsupportedArch(&'static str),

    #[error("no CUDA artifact has been bound in this process")]
    NotLoaded,

    #[error("invalid build config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CubindError>;
