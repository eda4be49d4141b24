use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use offline_webview_bundler::{OfflineBuildContext, OfflineBundler, ProjectConfig};

/// Bundle a JavaScript/3D project into a relative-path tree loadable by an offline WebView.
#[derive(Debug, Parser)]
#[command(name = "offline-webview-bundler", version)]
struct Cli {
  /// Project directory; the configuration is discovered here.
  #[arg(long, default_value = ".")]
  root: PathBuf,
  /// Explicit configuration file instead of `<root>/webview.config.json`.
  #[arg(long)]
  config: Option<PathBuf>,
  /// Output root, relative to the project root.
  #[arg(long)]
  out_dir: Option<String>,
  /// Public base prefixed to emitted URLs.
  #[arg(long)]
  base: Option<String>,
  /// Write into the output root without clearing it first.
  #[arg(long)]
  no_clean: bool,
  /// Also write `manifest.json`.
  #[arg(long)]
  manifest: bool,
  /// Additional script entry, relative to the project root. Repeatable.
  #[arg(long = "entry")]
  entries: Vec<String>,
  /// Build mode exposed as `import.meta.env.MODE`.
  #[arg(long)]
  mode: Option<String>,
}

static IS_INIT: AtomicBool = AtomicBool::new(false);

fn init_tracing() {
  use tracing_subscriber::{EnvFilter, fmt, prelude::*};
  if !IS_INIT.swap(true, Ordering::SeqCst) {
    tracing_subscriber::registry()
      .with(fmt::layer().with_target(false))
      .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
      .init();
  }
}

fn load_config(cli: &Cli) -> Result<(ProjectConfig, PathBuf)> {
  match &cli.config {
    Some(path) => {
      let config = ProjectConfig::from_path(path)?;
      let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
      Ok((config, dir))
    }
    None => Ok((ProjectConfig::discover(&cli.root)?, cli.root.clone())),
  }
}

fn run(cli: Cli) -> Result<()> {
  let (mut config, config_dir) = load_config(&cli).context("failed to load configuration")?;
  if let Some(out_dir) = cli.out_dir {
    config.out_dir = out_dir;
  }
  if let Some(base) = cli.base {
    config.base = base;
  }
  if let Some(mode) = cli.mode {
    config.mode = mode;
  }
  if cli.no_clean {
    config.empty_out_dir = false;
  }
  if cli.manifest {
    config.manifest = true;
  }
  config.entries.extend(cli.entries);

  let options = config
    .into_options(&config_dir)
    .context("invalid configuration")?;
  let root = options.root.clone();
  let bundler = OfflineBundler::new(OfflineBuildContext::new(options));
  let report = bundler
    .build()
    .with_context(|| format!("failed to bundle {}", root.display()))?;

  println!(
    "wrote {} files ({} chunks, {} assets) to {}",
    report.files.len(),
    report.chunks.len(),
    report.assets,
    report.out_dir.display()
  );
  Ok(())
}

fn main() -> ExitCode {
  init_tracing();
  match run(Cli::parse()) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("error: {err:#}");
      ExitCode::FAILURE
    }
  }
}
