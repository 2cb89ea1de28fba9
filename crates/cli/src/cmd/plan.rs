//! Implementation of the `plugbuild plan` command.
//!
//! Composes every pipeline and prints its stages in execution waves without
//! running any tool except the version query.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use plugbuild_lib::runner::ProcessRunner;
use plugbuild_lib::session::Session;

use crate::output::{OutputFormat, print_json, print_stat};

#[derive(Serialize)]
struct PlanJson {
  version: String,
  date: String,
  waves: Vec<Vec<String>>,
  artifacts: Vec<String>,
  test_executables: Vec<String>,
}

pub fn cmd_plan(session: &Session, format: OutputFormat) -> Result<()> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let metadata = rt.block_on(session.metadata(Arc::new(ProcessRunner)));

  let plan = session.plan(metadata).context("Failed to plan build")?;
  let waves = plan.waves().context("Failed to order stages")?;

  if format.is_json() {
    return print_json(&PlanJson {
      version: plan.metadata.version.clone(),
      date: plan.metadata.date.clone(),
      waves: waves
        .iter()
        .map(|wave| wave.iter().map(ToString::to_string).collect())
        .collect(),
      artifacts: plan
        .pipelines
        .iter()
        .map(|p| p.artifact_path.display().to_string())
        .collect(),
      test_executables: plan
        .pipelines
        .iter()
        .filter_map(|p| p.test_executable.as_ref())
        .map(|path| path.display().to_string())
        .collect(),
    });
  }

  println!("Plan: {} pipeline(s), {} stage(s)", plan.pipelines.len(), plan.graph.len());
  print_stat("Metadata", &plan.metadata.to_string());
  for (idx, wave) in waves.iter().enumerate() {
    println!("Wave {idx}:");
    for stage in wave {
      println!("  {stage}");
    }
  }
  Ok(())
}
