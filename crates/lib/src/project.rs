//! Project tree and per-pipeline output partitioning.
//!
//! Every intermediate directory is keyed by facet, build type, OS and
//! architecture. Two pipelines therefore never share an object or resource
//! directory, which is what lets them run concurrently.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{BuildType, Config, Layout};
use crate::platform::BuildTarget;
use crate::sources::Language;
use crate::variant::Facet;

/// Identity of one (target, variant) pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PipelineId {
  pub target: BuildTarget,
  pub facet: Facet,
}

impl PipelineId {
  pub fn new(target: BuildTarget, facet: Facet) -> Self {
    Self { target, facet }
  }
}

impl fmt::Display for PipelineId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.target, self.facet)
  }
}

/// The project being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
  pub root: PathBuf,
  pub layout: Layout,
  pub build_type: BuildType,
  pub product: String,
  pub prebuilt_foundation: Option<PathBuf>,
}

impl Project {
  pub fn new(root: impl Into<PathBuf>, config: &Config) -> Self {
    let root = root.into();
    let prebuilt_foundation = config.foundation.prebuilt.as_ref().map(|p| root.join(p));
    Self {
      root,
      layout: config.layout.clone(),
      build_type: config.build_type,
      product: config.product().to_string(),
      prebuilt_foundation,
    }
  }

  /// Resolve a layout-relative path against the project root.
  pub fn path(&self, relative: &Path) -> PathBuf {
    self.root.join(relative)
  }

  pub fn build_dir(&self) -> PathBuf {
    self.path(&self.layout.build_dir)
  }

  pub fn foundation_root(&self) -> PathBuf {
    self.path(&self.layout.foundation_root)
  }

  pub fn resource_script(&self) -> PathBuf {
    self.path(&self.layout.resource_script)
  }

  pub fn partition(&self, pipeline: PipelineId) -> Partition {
    Partition::new(&self.build_dir(), pipeline, self.build_type)
  }
}

/// The output directories owned by a single pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
  key: PathBuf,
  build_dir: PathBuf,
}

impl Partition {
  pub fn new(build_dir: &Path, pipeline: PipelineId, build_type: BuildType) -> Self {
    let key = PathBuf::from(pipeline.facet.as_str())
      .join(build_type.as_str())
      .join(pipeline.target.os.as_str())
      .join(pipeline.target.arch.as_str());
    Self {
      key,
      build_dir: build_dir.to_path_buf(),
    }
  }

  /// Object directory for one compile stage.
  pub fn object_dir(&self, language: Language) -> PathBuf {
    self.build_dir.join("objs").join(language.stage_dir()).join(&self.key)
  }

  /// Directory the link stage scans for resource artifacts.
  pub fn resource_dir(&self) -> PathBuf {
    self.build_dir.join("res").join(&self.key)
  }

  /// Private working directory handed to the resource translator.
  pub fn staging_dir(&self) -> PathBuf {
    self.build_dir.join("staging").join(&self.key)
  }

  /// Directory that receives the foundation archive and the linked library.
  pub fn lib_dir(&self) -> PathBuf {
    self.build_dir.join("lib").join(&self.key)
  }

  /// Object directory of the unit-test sources.
  pub fn test_object_dir(&self) -> PathBuf {
    self.build_dir.join("objs").join("test").join(&self.key)
  }

  /// Directory that receives the unit-test executable.
  pub fn test_bin_dir(&self) -> PathBuf {
    self.build_dir.join("tests").join(&self.key)
  }

  /// Every directory owned by this partition.
  pub fn all_dirs(&self) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Language::ALL.iter().map(|l| self.object_dir(*l)).collect();
    dirs.push(self.resource_dir());
    dirs.push(self.staging_dir());
    dirs.push(self.lib_dir());
    dirs.push(self.test_object_dir());
    dirs.push(self.test_bin_dir());
    dirs
  }
}
