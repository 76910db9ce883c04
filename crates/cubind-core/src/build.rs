//! Build orchestration: host C compiler for auxiliary objects, then nvcc for
//! the shared artifact.
//!
//! Every step blocks until the toolchain exits. A failed step is reported with
//! its full command line and combined output; nothing here retries.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::BuildConfig;
use crate::error::BuildError;

/// One build: `source` → `destination`, plus caller arguments for nvcc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub destination: PathBuf,
    pub source: PathBuf,
    pub extra_args: Vec<String>,
}

/// Produces a loadable artifact.
pub trait ArtifactBuilder {
    fn build(&self, request: &BuildRequest) -> Result<(), BuildError>;
}

/// Builds artifacts with the CUDA toolchain.
#[derive(Debug, Clone)]
pub struct NvccBuilder {
    config: BuildConfig,
}

impl NvccBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Compile the auxiliary sources into `scratch`, returning the objects.
    fn compile_aux(&self, scratch: &Path) -> Result<Vec<PathBuf>, BuildError> {
        // The compiler runs inside `scratch`, so relative roots must be pinned first.
        let sources: Vec<PathBuf> = self
            .config
            .aux_sources()
            .iter()
            .map(|src| absolute(src))
            .collect();
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = Command::new(&self.config.cc);
        cmd.current_dir(scratch).args(["-O2", "-fPIC", "-c"]).args(&sources);
        self.run(&mut cmd)?;

        Ok(sources
            .iter()
            .filter_map(|src| src.file_stem())
            .map(|stem| scratch.join(Path::new(stem).with_extension("o")))
            .collect())
    }

    /// Arguments for the accelerator compiler, excluding the program itself.
    pub fn compiler_args(&self, request: &BuildRequest, aux_objects: &[PathBuf]) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |arg: &dyn AsRef<OsStr>| args.push(arg.as_ref().to_os_string());

        push(&"-shared");
        push(&"-o");
        push(&request.destination);
        push(&request.source);
        push(&include_flag(&self.config.glue_root));
        if let Some(root) = &self.config.third_party_root {
            push(&include_flag(&root.join("src")));
        }
        push(&"-DTAKE_RESPONSIBILITY_FOR_ERROR_MESSAGE");
        for glue in self.config.glue_sources() {
            push(&glue);
        }
        for obj in aux_objects {
            push(obj);
        }
        if !cfg!(windows) {
            if let Some(cxx) = &self.config.cxx {
                push(&"-ccbin");
                push(cxx);
            }
            push(&"-Xcompiler");
            push(&"-fPIC,-fvisibility=hidden");
            push(&"-Xlinker");
            push(&"-Bsymbolic");
        }
        push(&"-cudart=shared");

        let source_dir = request.source.parent().unwrap_or_else(|| Path::new("."));
        args.extend(resolve_extra_args(source_dir, &request.extra_args));
        args
    }

    /// The nvcc command, wrapped in sccache when available.
    fn compiler_command(&self, args: Vec<OsString>) -> Command {
        let sccache = if self.config.use_sccache { find_on_path("sccache") } else { None };
        match sccache {
            Some(wrapper) => {
                let mut cmd = Command::new(wrapper);
                cmd.arg(&self.config.nvcc).args(args);
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.config.nvcc);
                cmd.args(args);
                cmd
            }
        }
    }

    /// Run `cmd` to completion, returning its combined output.
    fn run(&self, cmd: &mut Command) -> Result<String, BuildError> {
        let command = render(cmd);
        tracing::debug!(%command, "running toolchain");

        let out = cmd.output().map_err(|source| BuildError::Spawn {
            command: command.clone(),
            source,
        })?;
        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        if !out.status.success() {
            return Err(BuildError::Failed {
                command,
                status: out.status.to_string(),
                output,
            });
        }
        if self.config.debug {
            tracing::info!("{command}\n{output}");
        } else {
            tracing::debug!(%command, %output, "toolchain output");
        }
        Ok(output)
    }
}

impl ArtifactBuilder for NvccBuilder {
    fn build(&self, request: &BuildRequest) -> Result<(), BuildError> {
        tracing::info!(
            source = %request.source.display(),
            destination = %request.destination.display(),
            "building CUDA artifact"
        );

        // Auxiliary objects live only as long as this directory.
        let scratch = tempfile::Builder::new()
            .prefix("cubind-build-")
            .tempdir()
            .map_err(BuildError::Scratch)?;

        let aux_objects = self.compile_aux(scratch.path())?;
        let args = self.compiler_args(request, &aux_objects);
        let mut cmd = self.compiler_command(args);
        self.run(&mut cmd)?;

        tracing::info!(destination = %request.destination.display(), "artifact built");
        Ok(())
    }
}

/// Resolve caller arguments against the source directory.
///
/// Flags (leading `-`) pass through. Other tokens naming an existing file
/// next to the source become absolute paths; anything else passes through.
pub fn resolve_extra_args(source_dir: &Path, args: &[String]) -> Vec<OsString> {
    args.iter()
        .map(|arg| {
            if arg.starts_with('-') {
                return OsString::from(arg);
            }
            let file = source_dir.join(arg);
            match fs::metadata(&file) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => OsString::from(arg),
                _ => absolute(&file).into_os_string(),
            }
        })
        .collect()
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| env::current_dir().map(|cwd| cwd.join(path)))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn include_flag(dir: &Path) -> OsString {
    let mut flag = OsString::from("-I");
    flag.push(dir);
    flag
}

/// First executable named `program` on `PATH`.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    let file_name = format!("{program}{}", env::consts::EXE_SUFFIX);
    env::split_paths(&path)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn render(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
