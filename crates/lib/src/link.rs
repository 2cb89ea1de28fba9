//! Archiving, linking and artifact placement.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::compile::StageConfig;
use crate::macros::MacroSet;
use crate::platform::{Arch, Os};
use crate::runner::{CommandRunner, CommandSpec, RunError};
use crate::sources::SystemLibraries;
use crate::toolchain::Toolset;
use crate::util::hash::{self, Fingerprint, Fingerprintable};
use crate::variant::Facet;

/// Stem of the archive packed from the foundation objects.
pub const FOUNDATION_ARCHIVE_STEM: &str = "foundation";

#[derive(Debug, Error)]
pub enum LinkError {
  #[error("link input {0} does not exist")]
  MissingInput(PathBuf),

  #[error("{tool} failed: {source}")]
  Tool {
    tool: &'static str,
    #[source]
    source: RunError,
  },

  #[error("failed to scan resources in {path}: {message}")]
  ResourceScan { path: PathBuf, message: String },

  #[error("failed to fingerprint inputs: {0}")]
  Fingerprint(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum PlaceError {
  #[error("linked library {0} does not exist")]
  MissingInput(PathBuf),

  #[error("failed to create plugin directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("placement task failed: {0}")]
  Task(String),
}

/// The placed shared library of one (target, variant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkArtifact {
  pub output_path: PathBuf,
  pub embedded_macros: MacroSet,
}

/// `<product>_<ce|ultimate>_<arch>.<dll|so|dylib>`
pub fn artifact_file_name(product: &str, facet: Facet, os: Os, arch: Arch) -> String {
  format!(
    "{product}_{}_{}.{}",
    facet.file_tag(),
    arch.as_str(),
    os.shared_library_ext()
  )
}

#[derive(Serialize)]
pub(crate) struct LinkFingerprint<'a> {
  pub command: &'a CommandSpec,
  pub inputs: Vec<(String, Fingerprint)>,
  pub recorded: Vec<Option<Fingerprint>>,
  pub metadata: Vec<(&'a str, Option<&'a str>)>,
}

impl Fingerprintable for LinkFingerprint<'_> {}

pub(crate) fn hash_inputs<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Result<Vec<(String, Fingerprint)>, LinkError> {
  let mut out = Vec::new();
  for path in paths {
    if !path.exists() {
      return Err(LinkError::MissingInput(path.clone()));
    }
    out.push((path.display().to_string(), hash::hash_file(path)?));
  }
  Ok(out)
}

/// Fingerprints recorded beside built inputs. An object rebuilt for a header
/// change can be byte-identical to the previous one.
pub(crate) fn recorded_fingerprints<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Vec<Option<Fingerprint>> {
  paths.into_iter().map(|path| hash::read_fingerprint(path)).collect()
}

/// Packs foundation objects into a static archive.
#[derive(Debug, Clone)]
pub struct ArchiveStage {
  pub toolset: Toolset,
  pub objects: Vec<PathBuf>,
  pub output: PathBuf,
}

impl ArchiveStage {
  pub async fn run(&self, runner: &dyn CommandRunner) -> Result<PathBuf, LinkError> {
    let command = self.toolset.archive_command(&self.output, &self.objects);
    let fingerprint = LinkFingerprint {
      command: &command,
      inputs: hash_inputs(&self.objects)?,
      recorded: recorded_fingerprints(&self.objects),
      metadata: Vec::new(),
    }
    .fingerprint()?;

    if hash::is_fresh(&self.output, &fingerprint) {
      debug!(archive = %self.output.display(), "archive up to date");
      return Ok(self.output.clone());
    }

    if let Some(parent) = self.output.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    // Archivers append to an existing archive.
    if self.output.exists() {
      tokio::fs::remove_file(&self.output).await?;
    }
    runner
      .run(&command)
      .await
      .map_err(|source| LinkError::Tool { tool: "archiver", source })?;
    hash::write_fingerprint(&self.output, &fingerprint)?;
    info!(target = %self.toolset.target, objects = self.objects.len(), "archived foundation");
    Ok(self.output.clone())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
  pub library: PathBuf,
  pub relinked: bool,
}

/// Links every object, archive and compiled resource into the shared library.
#[derive(Debug, Clone)]
pub struct LinkStage {
  pub config: Arc<StageConfig>,
  pub objects: Vec<PathBuf>,
  pub archives: Vec<PathBuf>,
  pub resource_dir: PathBuf,
  pub system: SystemLibraries,
  pub output: PathBuf,
}

impl LinkStage {
  /// Compiled resource objects in the resource directory, sorted by name.
  pub fn discover_resources(&self) -> Result<Vec<PathBuf>, LinkError> {
    if !self.resource_dir.exists() {
      return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(&self.resource_dir).max_depth(1).sort_by_file_name() {
      let entry = entry.map_err(|e| LinkError::ResourceScan {
        path: self.resource_dir.clone(),
        message: e.to_string(),
      })?;
      if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "res") {
        found.push(entry.into_path());
      }
    }
    Ok(found)
  }

  pub async fn run(&self, runner: &dyn CommandRunner) -> Result<LinkOutcome, LinkError> {
    let resources = self.discover_resources()?;
    let command =
      self
        .config
        .toolset
        .link_command(&self.output, &self.objects, &self.archives, &resources, &self.system);

    let fingerprint = LinkFingerprint {
      command: &command,
      inputs: hash_inputs(self.objects.iter().chain(&self.archives).chain(&resources))?,
      recorded: recorded_fingerprints(self.objects.iter().chain(&self.archives)),
      metadata: self.config.metadata_macros().collect(),
    }
    .fingerprint()?;

    if hash::is_fresh(&self.output, &fingerprint) {
      debug!(library = %self.output.display(), "library up to date");
      return Ok(LinkOutcome {
        library: self.output.clone(),
        relinked: false,
      });
    }

    if let Some(parent) = self.output.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    runner
      .run(&command)
      .await
      .map_err(|source| LinkError::Tool { tool: "linker", source })?;
    hash::write_fingerprint(&self.output, &fingerprint)?;
    info!(
      target = %self.config.target(),
      objects = self.objects.len(),
      resources = resources.len(),
      "linked"
    );
    Ok(LinkOutcome {
      library: self.output.clone(),
      relinked: true,
    })
  }
}

/// Copies the linked library into the host's plugin directory.
#[derive(Debug, Clone)]
pub struct PlaceStage {
  pub library: PathBuf,
  pub destination: PathBuf,
  pub embedded_macros: MacroSet,
}

impl PlaceStage {
  pub async fn run(&self) -> Result<LinkArtifact, PlaceError> {
    let library = self.library.clone();
    let destination = self.destination.clone();
    tokio::task::spawn_blocking(move || place(&library, &destination))
      .await
      .map_err(|e| PlaceError::Task(e.to_string()))??;

    info!(path = %self.destination.display(), "placed artifact");
    Ok(LinkArtifact {
      output_path: self.destination.clone(),
      embedded_macros: self.embedded_macros.clone(),
    })
  }
}

/// Copy `library` to `destination` through a temporary file in the same
/// directory, so the destination is either the old file or the new one.
pub fn place(library: &Path, destination: &Path) -> Result<(), PlaceError> {
  if !library.exists() {
    return Err(PlaceError::MissingInput(library.to_path_buf()));
  }
  let dir = destination.parent().unwrap_or_else(|| Path::new("."));
  fs::create_dir_all(dir).map_err(|source| PlaceError::CreateDir {
    path: dir.to_path_buf(),
    source,
  })?;

  let write_err = |source| PlaceError::Write {
    path: destination.to_path_buf(),
    source,
  };
  let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
  let mut input = fs::File::open(library).map_err(write_err)?;
  io::copy(&mut input, temp.as_file_mut()).map_err(write_err)?;
  temp.as_file().sync_all().map_err(write_err)?;
  temp.persist(destination).map_err(|e| write_err(e.error))?;
  Ok(())
}
