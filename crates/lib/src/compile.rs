//! Staged compilation.
//!
//! The primary C++ stage owns a [`StageConfig`]: toolchain, target, include
//! paths, macros and codegen flags. The C and Objective-C++ stages are derived
//! from it and share the same `Arc`, so every object of a target is compiled
//! under identical assumptions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::deps::{self, Dependencies};
use crate::macros::{MacroError, MacroNamespace, MacroSet};
use crate::metadata::BuildMetadata;
use crate::platform::BuildTarget;
use crate::runner::{CommandRunner, CommandSpec, RunError};
use crate::sources::{CodegenFlags, CompileUnit, Language, Resolution};
use crate::toolchain::{CompileInvocation, Toolset};
use crate::util::hash::{self, Fingerprint, Fingerprintable};

#[derive(Debug, Error)]
pub enum CompileError {
  #[error("failed to read {path}: {source}")]
  Source {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to compile {path}: {source}")]
  Unit {
    path: PathBuf,
    #[source]
    source: RunError,
  },

  #[error("object {0} missing after compilation")]
  MissingObject(PathBuf),

  #[error("compile task failed: {0}")]
  Task(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("macro error: {0}")]
  Macro(#[from] MacroError),

  #[error("failed to fingerprint inputs: {0}")]
  Fingerprint(#[from] serde_json::Error),
}

/// Compile configuration recorded by the primary stage of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageConfig {
  pub toolset: Toolset,
  pub include_dirs: Vec<PathBuf>,
  pub macros: MacroSet,
  pub flags: CodegenFlags,
  /// Root that object paths mirror, usually the project root.
  pub source_root: PathBuf,
}

impl StageConfig {
  pub fn from_resolution(toolset: Toolset, resolution: &Resolution, source_root: impl Into<PathBuf>) -> Self {
    Self {
      toolset,
      include_dirs: resolution.include_dirs.clone(),
      macros: resolution.macros.clone(),
      flags: resolution.flags,
      source_root: source_root.into(),
    }
  }

  pub fn target(&self) -> BuildTarget {
    self.toolset.target
  }

  /// Append an include directory unless already present.
  pub fn add_include(&mut self, dir: impl Into<PathBuf>) {
    let dir = dir.into();
    if !self.include_dirs.contains(&dir) {
      self.include_dirs.push(dir);
    }
  }

  /// Stamp the version and date macros. Later stamps replace earlier ones.
  pub fn stamp(&mut self, metadata: &BuildMetadata) -> Result<(), MacroError> {
    self.macros.extend_from(&metadata.macros()?)
  }

  /// Metadata macros currently stamped.
  pub fn metadata_macros(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
    self
      .macros
      .in_namespace(MacroNamespace::Metadata)
      .map(|(name, def)| (name, def.value.as_deref()))
  }

  /// Macros a unit compiles with: its own overlay plus the stamped metadata.
  fn unit_macros(&self, unit: &CompileUnit) -> Result<MacroSet, MacroError> {
    let mut macros = unit.macros.clone();
    for (name, def) in self.macros.in_namespace(MacroNamespace::Metadata) {
      macros.define(MacroNamespace::Metadata, name, def.value.clone())?;
    }
    Ok(macros)
  }

  /// Object path for `source` inside `object_dir`, mirroring its location
  /// below the source root.
  pub fn object_path(&self, object_dir: &Path, source: &Path) -> PathBuf {
    let relative = source
      .strip_prefix(&self.source_root)
      .map(Path::to_path_buf)
      .unwrap_or_else(|_| source.file_name().map(PathBuf::from).unwrap_or_default());
    object_dir
      .join(relative)
      .with_extension(self.toolset.toolchain.object_ext())
  }
}

#[derive(Serialize)]
struct UnitFingerprint<'a> {
  source: &'a Fingerprint,
  command: &'a CommandSpec,
  dependencies: &'a Dependencies,
  metadata: Vec<(&'a str, Option<&'a str>)>,
}

impl Fingerprintable for UnitFingerprint<'_> {}

/// One language stage of one target.
#[derive(Debug, Clone)]
pub struct CompileStage {
  pub language: Language,
  pub config: Arc<StageConfig>,
  pub units: Vec<CompileUnit>,
  pub object_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutcome {
  pub objects: Vec<PathBuf>,
  pub compiled: usize,
  pub fresh: usize,
}

impl CompileStage {
  /// The primary C++ stage, owning the configuration.
  pub fn primary(config: StageConfig, units: Vec<CompileUnit>, object_dir: PathBuf) -> Self {
    Self {
      language: Language::Cpp,
      config: Arc::new(config),
      units,
      object_dir,
    }
  }

  /// A stage for `language` inheriting this stage's configuration.
  pub fn derive(&self, language: Language, units: Vec<CompileUnit>, object_dir: PathBuf) -> Self {
    Self {
      language,
      config: Arc::clone(&self.config),
      units,
      object_dir,
    }
  }

  pub fn object_paths(&self) -> Vec<PathBuf> {
    self
      .units
      .iter()
      .map(|u| self.config.object_path(&self.object_dir, &u.source))
      .collect()
  }

  /// Compile every unit whose fingerprint changed.
  ///
  /// The first failing unit aborts the rest of the stage.
  pub async fn run(
    &self,
    runner: Arc<dyn CommandRunner>,
    semaphore: Arc<Semaphore>,
  ) -> Result<CompileOutcome, CompileError> {
    let target = self.config.target();
    info!(target = %target, language = %self.language, units = self.units.len(), "compiling");

    let mut join_set = JoinSet::new();
    for unit in &self.units {
      let unit = unit.clone();
      let config = Arc::clone(&self.config);
      let object = config.object_path(&self.object_dir, &unit.source);
      let runner = Arc::clone(&runner);
      let semaphore = Arc::clone(&semaphore);

      join_set.spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|e| CompileError::Task(e.to_string()))?;
        compile_unit(&config, &unit, &object, runner.as_ref()).await
      });
    }

    let mut outcome = CompileOutcome::default();
    while let Some(joined) = join_set.join_next().await {
      let compiled = match joined {
        Ok(Ok(compiled)) => compiled,
        Ok(Err(e)) => {
          join_set.abort_all();
          return Err(e);
        }
        Err(e) => {
          join_set.abort_all();
          return Err(CompileError::Task(e.to_string()));
        }
      };
      if compiled {
        outcome.compiled += 1;
      } else {
        outcome.fresh += 1;
      }
    }

    outcome.objects = self.object_paths();
    for object in &outcome.objects {
      if !object.exists() {
        return Err(CompileError::MissingObject(object.clone()));
      }
    }

    debug!(
      target = %target,
      language = %self.language,
      compiled = outcome.compiled,
      fresh = outcome.fresh,
      "stage complete"
    );
    Ok(outcome)
  }
}

fn invocation<'a>(
  config: &'a StageConfig,
  unit: &'a CompileUnit,
  object: &'a Path,
  macros: &'a MacroSet,
) -> CompileInvocation<'a> {
  CompileInvocation {
    language: unit.language,
    component: unit.component,
    source: &unit.source,
    object,
    include_dirs: &config.include_dirs,
    macros,
    flags: config.flags,
  }
}

/// Compile one unit unless its object is fresh. Returns whether it ran.
async fn compile_unit(
  config: &StageConfig,
  unit: &CompileUnit,
  object: &Path,
  runner: &dyn CommandRunner,
) -> Result<bool, CompileError> {
  let text = tokio::fs::read(&unit.source)
    .await
    .map_err(|source| CompileError::Source {
      path: unit.source.clone(),
      source,
    })?;

  let macros = config.unit_macros(unit)?;
  let stable_cmd = config
    .toolset
    .compile_command(&invocation(config, unit, object, &macros.without(MacroNamespace::Metadata)));
  let fingerprint = unit_fingerprint(config, unit, object, &text, &stable_cmd).await?;

  if hash::is_fresh(object, &fingerprint) {
    debug!(source = %unit.source.display(), "object up to date");
    return Ok(false);
  }

  if let Some(parent) = object.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }

  let command = config.toolset.compile_command(&invocation(config, unit, object, &macros));
  let output = runner.run(&command).await.map_err(|source| CompileError::Unit {
    path: unit.source.clone(),
    source,
  })?;
  if config.toolset.toolchain.is_msvc() {
    deps::write_depfile(object, &deps::parse_show_includes(&output.stdout))?;
  }

  // The compiler's report may name headers the scan missed.
  let fingerprint = unit_fingerprint(config, unit, object, &text, &stable_cmd).await?;
  hash::write_fingerprint(object, &fingerprint)?;
  Ok(true)
}

/// Fingerprint of a unit's source, command and header dependencies.
///
/// Metadata macros only count when the source or one of its dependencies
/// names them.
async fn unit_fingerprint(
  config: &StageConfig,
  unit: &CompileUnit,
  object: &Path,
  text: &[u8],
  command: &CommandSpec,
) -> Result<Fingerprint, CompileError> {
  let watched: Vec<String> = config.metadata_macros().map(|(name, _)| name.to_string()).collect();
  let source = unit.source.clone();
  let object = object.to_path_buf();
  let include_dirs = config.include_dirs.clone();
  let dependencies =
    tokio::task::spawn_blocking(move || Dependencies::gather(&source, &object, &include_dirs, &watched))
      .await
      .map_err(|e| CompileError::Task(e.to_string()))?;

  let source_hash = hash::hash_bytes(text);
  let source_text = String::from_utf8_lossy(text);
  let fingerprint = UnitFingerprint {
    source: &source_hash,
    command,
    dependencies: &dependencies,
    metadata: config
      .metadata_macros()
      .filter(|(name, _)| source_text.contains(name) || dependencies.mentioned.contains(*name))
      .collect(),
  }
  .fingerprint()?;
  Ok(fingerprint)
}
