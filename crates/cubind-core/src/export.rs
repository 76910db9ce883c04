//! Copy built artifacts out of the executable's directory, e.g. into a
//! deployment bundle.

use std::env;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use crate::loader::executable_dir;

/// Copy every shared library in `from_dir` into `to_dir`.
///
/// A destination that is the same file as its source (hard link, symlink,
/// `to_dir == from_dir`) is skipped; any other existing file is overwritten.
/// Returns the destinations actually written.
pub fn export_artifacts(from_dir: &Path, to_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for entry in fs::read_dir(from_dir)? {
        let src = entry?.path();
        let is_artifact = src.is_file()
            && src.extension().is_some_and(|ext| ext == env::consts::DLL_EXTENSION);
        if !is_artifact {
            continue;
        }
        let Some(name) = src.file_name() else {
            continue;
        };
        let dst = to_dir.join(name);

        if is_same_file(&src, &dst)? {
            tracing::debug!(file = %src.display(), "already in place");
            continue;
        }
        tracing::info!("copying {} to {}", src.display(), dst.display());
        fs::copy(&src, &dst)?;
        copied.push(dst);
    }
    Ok(copied)
}

/// [`export_artifacts`] from the executable's directory, into the current
/// directory when `to_dir` is `None`.
pub fn export(to_dir: Option<&Path>) -> crate::Result<Vec<PathBuf>> {
    let from = executable_dir()?;
    let to = match to_dir {
        Some(dir) => dir.to_path_buf(),
        None => env::current_dir()?,
    };
    Ok(export_artifacts(&from, &to)?)
}

fn is_same_file(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_b = match fs::metadata(b) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let meta_a = fs::metadata(a)?;
    same_identity(a, &meta_a, b, &meta_b)
}

#[cfg(unix)]
fn same_identity(_: &Path, a: &Metadata, _: &Path, b: &Metadata) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;
    Ok(a.dev() == b.dev() && a.ino() == b.ino())
}

#[cfg(not(unix))]
fn same_identity(a: &Path, _: &Metadata, b: &Path, _: &Metadata) -> io::Result<bool> {
    Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
}
