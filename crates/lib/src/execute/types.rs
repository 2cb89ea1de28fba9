//! Types for stage execution.
//!
//! This module defines stage identities, the per-stage error taxonomy and the
//! report produced by executing a [`BuildPlan`](super::BuildPlan).

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::compile::{CompileError, CompileOutcome};
use crate::config::ConfigError;
use crate::link::{LinkArtifact, LinkError, LinkOutcome, PlaceError};
use crate::macros::MacroError;
use crate::project::PipelineId;
use crate::resources::{ResourceArtifact, ResourceError};
use crate::unit_test::{TestError, TestOutcome};

/// The kinds of stage a pipeline is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
  Resources,
  CompileCpp,
  CompileC,
  CompileObjCpp,
  Archive,
  Link,
  Place,
  CompileTest,
  LinkTest,
  RunTest,
}

impl StageKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Resources => "resources",
      Self::CompileCpp => "compile-cpp",
      Self::CompileC => "compile-c",
      Self::CompileObjCpp => "compile-objcpp",
      Self::Archive => "archive",
      Self::Link => "link",
      Self::Place => "place",
      Self::CompileTest => "compile-test",
      Self::LinkTest => "link-test",
      Self::RunTest => "run-test",
    }
  }
}

impl fmt::Display for StageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A stage of one pipeline, e.g. `linux-x64/base:compile-cpp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StageId {
  pub pipeline: PipelineId,
  pub kind: StageKind,
}

impl StageId {
  pub fn new(pipeline: PipelineId, kind: StageKind) -> Self {
    Self { pipeline, kind }
  }
}

impl fmt::Display for StageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.pipeline, self.kind)
  }
}

/// Errors that abort planning or execution as a whole.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("configuration error: {0}")]
  Config(#[from] ConfigError),

  #[error("macro error: {0}")]
  Macro(#[from] MacroError),

  #[error("stage {0} is not part of the plan")]
  UnknownStage(StageId),

  /// Cycle detected in the stage graph.
  #[error("dependency cycle detected")]
  CycleDetected,
}

/// Why a single stage failed. Fatal to its pipeline only.
#[derive(Debug, Error)]
pub enum StageError {
  #[error(transparent)]
  Compile(#[from] CompileError),

  #[error(transparent)]
  Resource(#[from] ResourceError),

  #[error(transparent)]
  Link(#[from] LinkError),

  #[error(transparent)]
  Place(#[from] PlaceError),

  #[error(transparent)]
  Test(#[from] TestError),

  #[error("stage task failed: {0}")]
  Task(String),
}

/// A stage error attributed to its stage.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
  pub stage: StageId,
  #[source]
  pub error: StageError,
}

/// What a successful stage produced.
#[derive(Debug, Clone)]
pub enum StageOutput {
  Compiled(CompileOutcome),
  Resources(Vec<ResourceArtifact>),
  Archived(PathBuf),
  Linked(LinkOutcome),
  Placed(LinkArtifact),
  TestLinked(LinkOutcome),
  Tested(TestOutcome),
}

/// Result of executing a build plan.
#[derive(Debug, Default)]
pub struct BuildReport {
  /// Artifacts written to the plugin directory.
  pub placed: BTreeMap<PipelineId, LinkArtifact>,

  /// The first failure of each failed pipeline.
  pub failures: BTreeMap<PipelineId, StageFailure>,

  /// Stages not run because a dependency failed, with that dependency.
  pub skipped: BTreeMap<StageId, StageId>,

  /// Outputs of every stage that succeeded.
  pub completed: BTreeMap<StageId, StageOutput>,

  /// Pipelines in the plan.
  pub pipelines: Vec<PipelineId>,
}

impl BuildReport {
  /// True only if every pipeline placed its artifact.
  pub fn is_success(&self) -> bool {
    self.failures.is_empty() && self.pipelines.iter().all(|p| self.placed.contains_key(p))
  }

  /// Number of compile units actually compiled (not up to date).
  pub fn compiled_units(&self) -> usize {
    self
      .completed
      .values()
      .map(|o| match o {
        StageOutput::Compiled(c) => c.compiled,
        _ => 0,
      })
      .sum()
  }

  pub fn relinked(&self) -> usize {
    self
      .completed
      .values()
      .filter(|o| matches!(o, StageOutput::Linked(l) if l.relinked))
      .count()
  }

  /// Number of unit-test executables actually run.
  pub fn tests_run(&self) -> usize {
    self
      .completed
      .values()
      .filter(|o| matches!(o, StageOutput::Tested(t) if t.ran))
      .count()
  }

  /// Record a stage failure; only the first per pipeline is kept.
  pub(crate) fn record_failure(&mut self, failure: StageFailure) {
    self.failures.entry(failure.stage.pipeline).or_insert(failure);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::{Arch, BuildTarget, Os};
  use crate::variant::Facet;

  fn pipeline(arch: Arch) -> PipelineId {
    PipelineId::new(BuildTarget::new(Os::Windows, arch), Facet::Base)
  }

  fn failure(kind: StageKind) -> StageFailure {
    StageFailure {
      stage: StageId::new(pipeline(Arch::X86), kind),
      error: StageError::Task("boom".to_string()),
    }
  }

  #[test]
  fn stage_id_display() {
    let id = StageId::new(pipeline(Arch::X64), StageKind::CompileObjCpp);
    assert_eq!(id.to_string(), "windows-x64/base:compile-objcpp");
  }

  #[test]
  fn empty_report_without_pipelines_succeeds() {
    assert!(BuildReport::default().is_success());
  }

  #[test]
  fn unplaced_pipeline_is_not_success() {
    let report = BuildReport {
      pipelines: vec![pipeline(Arch::X64)],
      ..BuildReport::default()
    };
    assert!(!report.is_success());
  }

  #[test]
  fn only_first_failure_per_pipeline_is_kept() {
    let mut report = BuildReport::default();
    report.record_failure(failure(StageKind::CompileC));
    report.record_failure(failure(StageKind::Resources));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[&pipeline(Arch::X86)].stage.kind, StageKind::CompileC);
  }

  #[test]
  fn failure_message_names_stage() {
    let message = failure(StageKind::Link).to_string();
    assert_eq!(message, "windows-x86/base:link failed: stage task failed: boom");
  }
}
