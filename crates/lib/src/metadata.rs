//! Build metadata: version string and build date.
//!
//! Both values are computed once per invocation and shared read-only by every
//! pipeline. A failing version query degrades to an empty version.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{BUILD_DATE_MACRO, BUILD_VERSION_MACRO};
use crate::macros::{MacroError, MacroNamespace, MacroSet, c_string_literal};
use crate::runner::{CommandRunner, CommandSpec, RunError};

/// Date format stamped into `BUILD_DATE`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildMetadata {
  pub version: String,
  pub date: String,
}

impl BuildMetadata {
  pub fn new(version: impl Into<String>, date: NaiveDate) -> Self {
    Self {
      version: version.into(),
      date: date.format(DATE_FORMAT).to_string(),
    }
  }

  /// Query the version once and stamp today's local date.
  pub async fn acquire(query: &dyn VersionQuery) -> Arc<Self> {
    Self::acquire_on(query, chrono::Local::now().date_naive()).await
  }

  pub async fn acquire_on(query: &dyn VersionQuery, date: NaiveDate) -> Arc<Self> {
    let version = match query.describe().await {
      Ok(version) => version.trim().to_string(),
      Err(e) => {
        debug!(error = %e, "version query failed, using empty version");
        String::new()
      }
    };
    Arc::new(Self::new(version, date))
  }

  /// The two metadata macros, quoted as C string literals.
  pub fn macros(&self) -> Result<MacroSet, MacroError> {
    let mut macros = MacroSet::new();
    macros.define(
      MacroNamespace::Metadata,
      BUILD_VERSION_MACRO,
      Some(c_string_literal(&self.version)),
    )?;
    macros.define(MacroNamespace::Metadata, BUILD_DATE_MACRO, Some(c_string_literal(&self.date)))?;
    Ok(macros)
  }
}

impl fmt::Display for BuildMetadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let version = if self.version.is_empty() {
      "<none>"
    } else {
      &self.version
    };
    write!(f, "{version} ({})", self.date)
  }
}

/// Source of the version string.
#[async_trait]
pub trait VersionQuery: Send + Sync + fmt::Debug {
  async fn describe(&self) -> Result<String, RunError>;
}

/// `git describe --tags --dirty` in the project root.
#[derive(Debug, Clone)]
pub struct GitDescribe {
  runner: Arc<dyn CommandRunner>,
  program: String,
  repo: PathBuf,
}

impl GitDescribe {
  pub fn new(runner: Arc<dyn CommandRunner>, program: Option<&str>, repo: impl Into<PathBuf>) -> Self {
    Self {
      runner,
      program: program.unwrap_or("git").to_string(),
      repo: repo.into(),
    }
  }
}

#[async_trait]
impl VersionQuery for GitDescribe {
  async fn describe(&self) -> Result<String, RunError> {
    let spec = CommandSpec::new(&self.program)
      .args(["describe", "--tags", "--dirty"])
      .cwd(&self.repo);
    let output = self.runner.run(&spec).await?;
    Ok(output.stdout)
  }
}

/// A fixed version, or a query that always fails.
#[derive(Debug, Clone, Default)]
pub struct FixedVersion(pub Option<String>);

impl FixedVersion {
  pub fn new(version: impl Into<String>) -> Self {
    Self(Some(version.into()))
  }

  pub fn unavailable() -> Self {
    Self(None)
  }
}

#[async_trait]
impl VersionQuery for FixedVersion {
  async fn describe(&self) -> Result<String, RunError> {
    self.0.clone().ok_or_else(|| RunError::Failed {
      program: "git".to_string(),
      code: Some(128),
      stderr: "fatal: not a git repository".to_string(),
    })
  }
}
