//! Project configuration.
//!
//! Settings come from an optional `plugbuild.toml` at the project root. Every
//! key is optional; a missing file yields [`Config::default`]. Command-line
//! flags and the environment are layered on top by the caller.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_FILENAME, DEFAULT_PRODUCT};
use crate::platform::Os;

/// Errors detected before any pipeline starts.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("config file not found: {0}")]
  NotFound(PathBuf),

  #[error("no build targets selected")]
  EmptyTargetSet,

  #[error("unknown build target: {0}")]
  UnknownTarget(String),

  #[error("parallelism must be at least 1")]
  InvalidParallelism,

  #[error("cannot determine the home directory; set home_dir in {CONFIG_FILENAME}")]
  NoHomeDir,

  #[error("output directory {dir} is shared by {first} and {second}")]
  PartitionCollision { dir: PathBuf, first: String, second: String },

  #[error("failed to scan sources under {path}: {message}")]
  SourceScan { path: PathBuf, message: String },

  #[error("macro error: {0}")]
  Macro(#[from] crate::macros::MacroError),
}

/// Optimization profile; part of the object-directory partition key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
  Debug,
  #[default]
  Release,
}

impl BuildType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Debug => "debug",
      Self::Release => "release",
    }
  }

  pub fn is_optimized(&self) -> bool {
    matches!(self, Self::Release)
  }

  pub fn is_debuggable(&self) -> bool {
    matches!(self, Self::Debug)
  }
}

impl fmt::Display for BuildType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Relative locations of the inputs inside the project tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layout {
  pub plugin_sources: PathBuf,
  pub plugin_headers: PathBuf,
  pub extended_sources: PathBuf,
  pub extended_headers: PathBuf,
  pub foundation_root: PathBuf,
  pub resource_script: PathBuf,
  pub test_sources: PathBuf,
  pub build_dir: PathBuf,
}

impl Default for Layout {
  fn default() -> Self {
    Self {
      plugin_sources: PathBuf::from("src/main/cpp"),
      plugin_headers: PathBuf::from("src/main/headers"),
      extended_sources: PathBuf::from("src/main/LPE-U/cpp"),
      extended_headers: PathBuf::from("src/main/LPE-U/headers"),
      foundation_root: PathBuf::from("WDL-library/src/main/cpp"),
      resource_script: PathBuf::from("src/main/headers/resources/resource.rc"),
      test_sources: PathBuf::from("src/test/cpp"),
      build_dir: PathBuf::from("build"),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FoundationConfig {
  /// Static archive to link instead of compiling the foundation sources.
  pub prebuilt: Option<PathBuf>,
}

/// Per-OS program overrides; unset entries use the toolchain default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgramOverrides {
  pub cc: Option<String>,
  pub cxx: Option<String>,
  pub objcxx: Option<String>,
  pub ar: Option<String>,
  pub rc: Option<String>,
  pub linker: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainOverrides {
  pub windows: ProgramOverrides,
  pub linux: ProgramOverrides,
  pub macos: ProgramOverrides,
}

impl ToolchainOverrides {
  pub fn for_os(&self, os: Os) -> &ProgramOverrides {
    match os {
      Os::Windows => &self.windows,
      Os::Linux => &self.linux,
      Os::MacOs => &self.macos,
    }
  }
}

/// External resource translator invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorConfig {
  /// Program to run; defaults to `php`.
  pub program: Option<String>,
  /// Arguments placed before the script paths; defaults to the swell resgen script.
  pub args: Option<Vec<String>>,
}

/// Unit-test executable built next to the plugin on x64 targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestConfig {
  pub enabled: bool,
  /// Run the executable after linking when the target is the host.
  pub run: bool,
  /// Test framework headers, e.g. googletest's `include` directory.
  pub include_dirs: Vec<PathBuf>,
  /// Test framework archives, e.g. `libgtest.a` and `libgtest_main.a`.
  pub archives: Vec<PathBuf>,
}

impl Default for TestConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      run: true,
      include_dirs: Vec::new(),
      archives: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VcsConfig {
  pub program: Option<String>,
}

/// Contents of `plugbuild.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub product: Option<String>,
  pub facet: Option<String>,
  pub build_type: BuildType,
  pub targets: Vec<String>,
  pub parallelism: Option<usize>,
  pub plugin_dir: Option<PathBuf>,
  pub home_dir: Option<PathBuf>,
  pub layout: Layout,
  pub foundation: FoundationConfig,
  pub toolchain: ToolchainOverrides,
  pub translator: TranslatorConfig,
  pub tests: TestConfig,
  pub vcs: VcsConfig,
}

impl Config {
  /// Load configuration for a project.
  ///
  /// An explicit path must exist. Without one, `<project>/plugbuild.toml` is
  /// read if present and defaults are used otherwise.
  pub fn load(project_root: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let path = match explicit {
      Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
      Some(path) => path.to_path_buf(),
      None => {
        let candidate = project_root.join(CONFIG_FILENAME);
        if !candidate.exists() {
          debug!(project = %project_root.display(), "no config file, using defaults");
          return Ok(Self::default());
        }
        candidate
      }
    };

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
      path: path.clone(),
      source,
    })?;
    let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
      path: path.clone(),
      source,
    })?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
  }

  pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(content)
  }

  pub fn product(&self) -> &str {
    self.product.as_deref().unwrap_or(DEFAULT_PRODUCT)
  }

  /// Parallelism to use, validated to be at least one.
  pub fn parallelism(&self) -> Result<usize, ConfigError> {
    match self.parallelism {
      Some(0) => Err(ConfigError::InvalidParallelism),
      Some(n) => Ok(n),
      None => Ok(std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)),
    }
  }

  /// Home directory used by the placement convention.
  pub fn resolve_home(&self) -> Result<PathBuf, ConfigError> {
    self
      .home_dir
      .clone()
      .or_else(crate::platform::paths::home_dir)
      .ok_or(ConfigError::NoHomeDir)
  }
}
