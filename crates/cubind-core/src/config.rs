//! Toolchain configuration for building artifacts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CubindError, Result};

pub const ENV_CC: &str = "CC";
pub const ENV_CXX: &str = "CXX";
pub const ENV_NVCC: &str = "NVCC";
pub const ENV_SRC_ROOT: &str = "CUBIND_SRC_ROOT";
pub const ENV_THIRD_PARTY_ROOT: &str = "CUBIND_THIRD_PARTY_ROOT";
pub const ENV_NO_SCCACHE: &str = "CUBIND_NO_SCCACHE";
pub const ENV_CFLAGS: &str = "CUBIND_CFLAGS";

/// Substring of `CUBIND_CFLAGS` that turns on build/bind debug output.
pub const DEBUG_MARKER: &str = "__CUBIND_DEBUG__";

/// How `NvccBuilder` invokes the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Host C compiler for the auxiliary objects.
    pub cc: String,

    /// Host C++ compiler passed to nvcc as `-ccbin` (ignored on Windows).
    pub cxx: Option<String>,

    /// Accelerator compiler.
    pub nvcc: String,

    /// Root holding `cubind.h` and the glue sources under `util/`.
    pub glue_root: PathBuf,

    /// Third-party source root providing `build/assembly.S` and
    /// `src/cpuid.c`. No auxiliary objects are built without it.
    pub third_party_root: Option<PathBuf>,

    /// Wrap nvcc in `sccache` when it is on `PATH`.
    pub use_sccache: bool,

    /// Log every toolchain command and its output at `info` level.
    pub debug: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cc: "gcc".to_string(),
            cxx: None,
            nvcc: "nvcc".to_string(),
            glue_root: default_glue_root(),
            third_party_root: None,
            use_sccache: true,
            debug: false,
        }
    }
}

/// The `native/` directory shipped with this crate.
pub fn default_glue_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("native")
}

impl BuildConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, falling back to
    /// the defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let set = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            cc: set(ENV_CC).unwrap_or(defaults.cc),
            cxx: set(ENV_CXX),
            nvcc: set(ENV_NVCC).unwrap_or(defaults.nvcc),
            glue_root: set(ENV_SRC_ROOT).map(PathBuf::from).unwrap_or(defaults.glue_root),
            third_party_root: set(ENV_THIRD_PARTY_ROOT).map(PathBuf::from),
            use_sccache: set(ENV_NO_SCCACHE).is_none(),
            debug: lookup(ENV_CFLAGS).is_some_and(|flags| flags.contains(DEBUG_MARKER)),
        }
    }

    /// Load a JSON configuration file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| CubindError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Host-provided glue sources compiled into every artifact.
    pub fn glue_sources(&self) -> Vec<PathBuf> {
        vec![self.glue_root.join("util").join("all_gpus.cpp")]
    }

    /// Auxiliary sources compiled with the host C compiler.
    pub fn aux_sources(&self) -> Vec<PathBuf> {
        match &self.third_party_root {
            Some(root) => vec![
                root.join("build").join("assembly.S"),
                root.join("src").join("cpuid.c"),
            ],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = BuildConfig::from_lookup(lookup(&[]));
        assert_eq!(config, BuildConfig::default());
        assert_eq!(config.cc, "gcc");
        assert!(config.use_sccache);
        assert!(!config.debug);
        assert!(config.aux_sources().is_empty());
    }

    #[test]
    fn test_environment_overrides() {
        let config = BuildConfig::from_lookup(lookup(&[
            (ENV_CC, "clang"),
            (ENV_CXX, "clang++"),
            (ENV_THIRD_PARTY_ROOT, "/src/blst"),
            (ENV_NO_SCCACHE, "1"),
            (ENV_CFLAGS, "-O2 -D__CUBIND_DEBUG__"),
        ]));
        assert_eq!(config.cc, "clang");
        assert_eq!(config.cxx.as_deref(), Some("clang++"));
        assert!(!config.use_sccache);
        assert!(config.debug);
        assert_eq!(
            config.aux_sources(),
            vec![
                PathBuf::from("/src/blst/build/assembly.S"),
                PathBuf::from("/src/blst/src/cpuid.c"),
            ]
        );
    }

    #[test]
    fn test_debug_requires_marker() {
        let config = BuildConfig::from_lookup(lookup(&[(ENV_CFLAGS, "-O2 -g")]));
        assert!(!config.debug);
    }

    #[test]
    fn test_json_config_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cubind.json");
        std::fs::write(&path, r#"{ "nvcc": "/usr/local/cuda/bin/nvcc", "use_sccache": false }"#).unwrap();

        let config = BuildConfig::from_json_file(&path).unwrap();
        assert_eq!(config.nvcc, "/usr/local/cuda/bin/nvcc");
        assert!(!config.use_sccache);
        assert_eq!(config.cc, "gcc");
    }

    #[test]
    fn test_invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cubind.json");
        std::fs::write(&path, "{ nvcc = 1 }").unwrap();
        assert!(matches!(
            BuildConfig::from_json_file(&path),
            Err(CubindError::Config { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        std::env::set_var(ENV_NVCC, "/opt/cuda/bin/nvcc");
        std::env::set_var(ENV_CFLAGS, DEBUG_MARKER);
        let config = BuildConfig::from_env();
        std::env::remove_var(ENV_NVCC);
        std::env::remove_var(ENV_CFLAGS);

        assert_eq!(config.nvcc, "/opt/cuda/bin/nvcc");
        assert!(config.debug);
    }
}
