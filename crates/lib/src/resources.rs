//! Resource translation.
//!
//! Windows compiles the canonical resource script straight into a binary
//! resource object. Unix targets hand the script to an external translator,
//! which writes dialog and menu descriptions next to its copy of the script;
//! those files are then relocated into the target's resource directory where
//! compile and link pick them up by directory.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TranslatorConfig;
use crate::platform::BuildTarget;
use crate::project::Project;
use crate::runner::{CommandRunner, CommandSpec, RunError};
use crate::toolchain::Toolset;

/// Suffixes the translator appends to its script copy.
pub const DIALOG_SUFFIX: &str = "_mac_dlg";
pub const MENU_SUFFIX: &str = "_mac_menu";

/// File name of the compiled Windows resource object.
pub const COMPILED_RESOURCE_NAME: &str = "resource.res";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  Dialog,
  Menu,
  CompiledResource,
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Dialog => "dialog",
      Self::Menu => "menu",
      Self::CompiledResource => "compiled resource",
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceArtifact {
  pub kind: ResourceKind,
  pub path: PathBuf,
}

/// Progress of a target's resource stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
  Pending,
  Translated,
  Relocated,
  ResourceCompiled,
}

#[derive(Debug, Error)]
pub enum ResourceError {
  #[error("resource script not found: {0}")]
  MissingScript(PathBuf),

  #[error("resource translator failed: {0}")]
  Translator(#[source] RunError),

  #[error("resource compiler failed: {0}")]
  Compiler(#[source] RunError),

  #[error("translator did not produce {kind} output {path}")]
  MissingArtifact { kind: ResourceKind, path: PathBuf },

  #[error("failed to relocate {from} to {to}: {source}")]
  Relocate {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Turns a canonical resource script into native dialog and menu files.
///
/// `copy` is a private copy of the script; outputs are written beside it.
#[async_trait]
pub trait ResourceTranslator: Send + Sync + fmt::Debug {
  async fn translate(&self, script: &Path, copy: &Path) -> Result<Vec<ResourceArtifact>, ResourceError>;
}

/// Paths the translator writes for a given script copy.
pub fn expected_outputs(copy: &Path) -> [ResourceArtifact; 2] {
  let with_suffix = |suffix: &str| {
    let mut name = copy.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
  };
  [
    ResourceArtifact {
      kind: ResourceKind::Dialog,
      path: with_suffix(DIALOG_SUFFIX),
    },
    ResourceArtifact {
      kind: ResourceKind::Menu,
      path: with_suffix(MENU_SUFFIX),
    },
  ]
}

/// Runs the external translator through a [`CommandRunner`].
#[derive(Debug, Clone)]
pub struct SubprocessTranslator {
  runner: Arc<dyn CommandRunner>,
  program: String,
  args: Vec<String>,
}

impl SubprocessTranslator {
  pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, args: Vec<String>) -> Self {
    Self {
      runner,
      program: program.into(),
      args,
    }
  }

  /// `php <foundation>/WDL/swell/mac_resgen.php` unless configured otherwise.
  pub fn from_config(runner: Arc<dyn CommandRunner>, config: &TranslatorConfig, project: &Project) -> Self {
    let program = config.program.clone().unwrap_or_else(|| "php".to_string());
    let args = config.args.clone().unwrap_or_else(|| {
      vec![
        project
          .foundation_root()
          .join("WDL/swell/mac_resgen.php")
          .display()
          .to_string(),
      ]
    });
    Self::new(runner, program, args)
  }
}

#[async_trait]
impl ResourceTranslator for SubprocessTranslator {
  async fn translate(&self, script: &Path, copy: &Path) -> Result<Vec<ResourceArtifact>, ResourceError> {
    let expected = expected_outputs(copy);
    let mut spec = CommandSpec::new(&self.program)
      .args(self.args.iter().cloned())
      .arg(script.display().to_string())
      .arg(copy.display().to_string());
    if let Some(dir) = copy.parent() {
      spec = spec.cwd(dir);
    }
    for artifact in &expected {
      spec = spec.output(&artifact.path);
    }

    self.runner.run(&spec).await.map_err(ResourceError::Translator)?;
    Ok(expected.to_vec())
  }
}

/// Translator that derives its outputs from the script contents alone.
#[derive(Debug, Default)]
pub struct InMemoryTranslator {
  invocations: AtomicUsize,
  fail: bool,
}

impl InMemoryTranslator {
  pub fn new() -> Self {
    Self::default()
  }

  /// A translator whose every invocation fails, as with a missing tool.
  pub fn failing() -> Self {
    Self {
      invocations: AtomicUsize::new(0),
      fail: true,
    }
  }

  pub fn invocations(&self) -> usize {
    self.invocations.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ResourceTranslator for InMemoryTranslator {
  async fn translate(&self, _script: &Path, copy: &Path) -> Result<Vec<ResourceArtifact>, ResourceError> {
    self.invocations.fetch_add(1, Ordering::SeqCst);
    if self.fail {
      return Err(ResourceError::Translator(RunError::Spawn {
        program: "translator".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
      }));
    }

    let content = tokio::fs::read_to_string(copy).await?;
    let expected = expected_outputs(copy);
    for artifact in &expected {
      let keyword = match artifact.kind {
        ResourceKind::Dialog => "DIALOG",
        _ => "MENU",
      };
      let body: String = content
        .lines()
        .filter(|line| line.contains(keyword))
        .map(|line| format!("// {}\n", line.trim()))
        .collect();
      tokio::fs::write(&artifact.path, format!("#pragma once\n{body}")).await?;
    }
    Ok(expected.to_vec())
  }
}

/// Move translator outputs into `dest_dir`, replacing previous files.
pub async fn relocate(artifacts: &[ResourceArtifact], dest_dir: &Path) -> Result<Vec<ResourceArtifact>, ResourceError> {
  tokio::fs::create_dir_all(dest_dir).await?;
  let mut moved = Vec::with_capacity(artifacts.len());
  for artifact in artifacts {
    if !artifact.path.exists() {
      return Err(ResourceError::MissingArtifact {
        kind: artifact.kind,
        path: artifact.path.clone(),
      });
    }
    let Some(name) = artifact.path.file_name() else {
      return Err(ResourceError::MissingArtifact {
        kind: artifact.kind,
        path: artifact.path.clone(),
      });
    };
    let to = dest_dir.join(name);
    move_file(&artifact.path, &to)
      .await
      .map_err(|source| ResourceError::Relocate {
        from: artifact.path.clone(),
        to: to.clone(),
        source,
      })?;
    moved.push(ResourceArtifact {
      kind: artifact.kind,
      path: to,
    });
  }
  Ok(moved)
}

async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
  if to.exists() {
    tokio::fs::remove_file(to).await?;
  }
  match tokio::fs::rename(from, to).await {
    Ok(()) => Ok(()),
    Err(_) => {
      // Cross-device: copy then remove.
      tokio::fs::copy(from, to).await?;
      tokio::fs::remove_file(from).await
    }
  }
}

/// The resource stage of one target.
#[derive(Debug, Clone)]
pub struct ResourceStage {
  pub toolset: Toolset,
  pub script: PathBuf,
  pub include_dirs: Vec<PathBuf>,
  pub staging_dir: PathBuf,
  pub resource_dir: PathBuf,
}

impl ResourceStage {
  pub fn target(&self) -> BuildTarget {
    self.toolset.target
  }

  pub async fn run(
    &self,
    translator: &dyn ResourceTranslator,
    runner: &dyn CommandRunner,
  ) -> Result<Vec<ResourceArtifact>, ResourceError> {
    let target = self.target();
    if !self.script.exists() {
      return Err(ResourceError::MissingScript(self.script.clone()));
    }
    debug!(target = %target, state = ?ResourceState::Pending, "resource stage");

    if !target.os.is_unix() {
      tokio::fs::create_dir_all(&self.resource_dir).await?;
      let output = self.resource_dir.join(COMPILED_RESOURCE_NAME);
      let command = self.toolset.resource_command(&self.script, &output, &self.include_dirs);
      runner.run(&command).await.map_err(ResourceError::Compiler)?;
      info!(target = %target, state = ?ResourceState::ResourceCompiled, "resources compiled");
      return Ok(vec![ResourceArtifact {
        kind: ResourceKind::CompiledResource,
        path: output,
      }]);
    }

    tokio::fs::create_dir_all(&self.staging_dir).await?;
    let file_name = self.script.file_name().unwrap_or(OsStr::new("resource.rc"));
    let copy = self.staging_dir.join(file_name);
    tokio::fs::copy(&self.script, &copy).await?;

    let produced = translator.translate(&self.script, &copy).await?;
    debug!(target = %target, state = ?ResourceState::Translated, count = produced.len(), "translated");

    let relocated = relocate(&produced, &self.resource_dir).await?;
    info!(
      target = %target,
      state = ?ResourceState::Relocated,
      count = relocated.len(),
      dir = %self.resource_dir.display(),
      "resources relocated"
    );
    Ok(relocated)
  }
}
