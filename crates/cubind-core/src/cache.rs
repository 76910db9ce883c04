//! Artifact staleness check.

use std::fs::{self, OpenOptions};
use std::path::Path;

/// Whether `destination` has to be (re)built from `source`.
///
/// A source we cannot open read-write is taken to be a read-only deployment:
/// the cached artifact is authoritative and staleness is not checked. For a
/// writable source, rebuild when the artifact is missing or strictly older.
pub fn needs_rebuild(source: &Path, destination: &Path) -> bool {
    let source_meta = match OpenOptions::new()
        .read(true)
        .write(true)
        .open(source)
        .and_then(|file| file.metadata())
    {
        Ok(meta) => meta,
        Err(e) => {
            tracing::debug!(source = %source.display(), "source not writable ({e}), trusting cached artifact");
            return false;
        }
    };

    let rebuild = match fs::metadata(destination) {
        Err(_) => true,
        Ok(dest_meta) => match (source_meta.modified(), dest_meta.modified()) {
            (Ok(src_time), Ok(dest_time)) => src_time > dest_time,
            _ => true,
        },
    };
    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        rebuild,
        "artifact cache check"
    );
    rebuild
}
