mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use plugbuild_lib::session::{Overrides, Session};

use output::OutputFormat;

/// Cross-platform build orchestrator for the live presets host plugin
#[derive(Parser)]
#[command(name = "plugbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(flatten)]
  project: ProjectArgs,

  #[command(subcommand)]
  command: Commands,
}

/// Options shared by every command that reads a project.
#[derive(Args, Debug, Clone)]
struct ProjectArgs {
  /// Project root directory
  #[arg(long, global = true, default_value = ".")]
  project: PathBuf,

  /// Config file (default: <project>/plugbuild.toml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Variant facet (base/ce or extended/ultimate)
  #[arg(long, global = true)]
  facet: Option<String>,

  /// Build only this target triple, e.g. windows-x86 (repeatable)
  #[arg(long = "target", global = true)]
  targets: Vec<String>,

  /// Maximum number of concurrently running tools
  #[arg(short, long, global = true)]
  jobs: Option<usize>,

  /// Also build the unit-test executable on x64 targets
  #[arg(long, global = true)]
  tests: bool,
}

impl ProjectArgs {
  fn open(&self) -> Result<Session> {
    let overrides = Overrides {
      config_path: self.config.clone(),
      facet: self.facet.clone(),
      targets: self.targets.clone(),
      jobs: self.jobs,
      tests: self.tests,
    };
    Session::open(&self.project, &overrides)
      .with_context(|| format!("Failed to open project {}", self.project.display()))
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Build and place the plugin for every selected target
  Build,

  /// Show the stage waves a build would execute
  Plan {
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// List the selected targets and their artifact paths
  Targets {
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show host platform and build metadata
  Info,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build => {
      if !cmd::cmd_build(&cli.project.open()?)? {
        std::process::exit(1);
      }
      Ok(())
    }
    Commands::Plan { output } => cmd::cmd_plan(&cli.project.open()?, output),
    Commands::Targets { output } => cmd::cmd_targets(&cli.project.open()?, output),
    Commands::Info => cmd::cmd_info(&cli.project.open()?),
  }
}
