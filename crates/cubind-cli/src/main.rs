use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cubind::{ArtifactBuilder, BuildConfig, BuildRequest, NvccBuilder};

#[derive(Parser)]
#[command(
    name = "cubind",
    about = "Build, bind and ship CUDA artifacts for cubind",
    long_about = "Build a .cu module into a shared library the way cubind does at runtime,\nprobe an existing artifact, or copy built artifacts into a deployment directory.",
    version,
)]
struct Cli {
    /// Log toolchain commands and binding details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show platform and toolchain configuration
    Info {
        /// JSON build config (defaults to the environment)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compile a .cu source into a shared artifact
    Build {
        /// Path to the .cu source
        source: PathBuf,
        /// Output directory (defaults to the source's directory)
        #[arg(long)]
        out: Option<PathBuf>,
        /// JSON build config (defaults to the environment)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Extra nvcc arguments; bare names resolve against the source directory
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Bind an existing artifact and run the availability probe
    Load {
        /// Path to the shared artifact
        artifact: PathBuf,
    },
    /// Copy built artifacts from the executable's directory
    Export {
        /// Source directory (defaults to the executable's directory)
        #[arg(long)]
        from: Option<PathBuf>,
        /// Destination directory (defaults to the current directory)
        #[arg(long)]
        to: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Info { config } => cmd_info(config.as_deref()),
        Commands::Build { source, out, config, args } => {
            cmd_build(&source, out.as_deref(), config.as_deref(), args)
        }
        Commands::Load { artifact } => cmd_load(&artifact),
        Commands::Export { from, to } => cmd_export(from.as_deref(), to.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "cubind=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BuildConfig> {
    match path {
        Some(path) => BuildConfig::from_json_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(BuildConfig::from_env()),
    }
}

fn cmd_info(config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;

    println!("cubind v{}\n", env!("CARGO_PKG_VERSION"));

    println!("Platform");
    println!("  OS:        {}", std::env::consts::OS);
    println!("  Arch:      {}", std::env::consts::ARCH);
    println!(
        "  Supported: {}",
        if cubind::loader::check_arch(std::env::consts::ARCH).is_ok() { "[x]" } else { "[ ]" }
    );
    println!("  Artifacts: *.{}", std::env::consts::DLL_EXTENSION);

    println!("\nToolchain");
    println!("  cc:          {}", config.cc);
    println!("  cxx:         {}", config.cxx.as_deref().unwrap_or("(nvcc default)"));
    println!("  nvcc:        {}", describe_program(&config.nvcc));
    let sccache = cubind::build::find_on_path("sccache");
    println!(
        "  sccache:     {}",
        match (&sccache, config.use_sccache) {
            (Some(path), true) => path.display().to_string(),
            (Some(_), false) => "disabled".to_string(),
            (None, _) => "not found".to_string(),
        }
    );
    println!("  glue root:   {}", config.glue_root.display());
    println!(
        "  third party: {}",
        config
            .third_party_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("  debug:       {}", config.debug);

    println!("\nSymbols");
    for name in <cubind::CoreSymbols as cubind::SymbolTable>::NAMES {
        println!("  {name}");
    }
    Ok(())
}

fn describe_program(program: &str) -> String {
    if Path::new(program).components().count() > 1 {
        return program.to_string();
    }
    match cubind::build::find_on_path(program) {
        Some(path) => path.display().to_string(),
        None => format!("{program} (not found on PATH)"),
    }
}

fn cmd_build(
    source: &Path,
    out: Option<&Path>,
    config: Option<&Path>,
    args: Vec<String>,
) -> anyhow::Result<()> {
    if !source.is_file() {
        bail!("{}: no such source file", source.display());
    }
    let stem = source
        .file_stem()
        .with_context(|| format!("{}: no file name", source.display()))?;
    let out_dir = match out {
        Some(dir) => dir.to_path_buf(),
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let mut destination = out_dir.join(stem);
    destination.set_extension(std::env::consts::DLL_EXTENSION);

    let builder = NvccBuilder::new(load_config(config)?);
    tracing::debug!(source = %source.display(), destination = %destination.display(), "building");
    builder.build(&BuildRequest {
        destination: destination.clone(),
        source: source.to_path_buf(),
        extra_args: args,
    })?;

    println!("{}", destination.display());
    Ok(())
}

fn cmd_load(artifact: &Path) -> anyhow::Result<()> {
    let bound = cubind::bind(artifact)
        .with_context(|| format!("binding {}", artifact.display()))?;
    println!("bound {}", bound.path().display());
    println!("cuda_available: {}", bound.cuda_available());
    Ok(())
}

fn cmd_export(from: Option<&Path>, to: Option<&Path>) -> anyhow::Result<()> {
    let copied = match from {
        Some(from) => {
            let to = match to {
                Some(dir) => dir.to_path_buf(),
                None => std::env::current_dir()?,
            };
            cubind::export_artifacts(from, &to)?
        }
        None => cubind::export(to)?,
    };
    if copied.is_empty() {
        println!("nothing to copy");
    }
    for path in copied {
        println!("{}", path.display());
    }
    Ok(())
}
