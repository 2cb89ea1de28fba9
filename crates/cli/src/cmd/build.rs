//! Implementation of the `plugbuild build` command.
//!
//! Builds every selected target with real subprocesses and places the
//! resulting libraries into the host's plugin directories.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use plugbuild_lib::runner::{CommandRunner, ProcessRunner};
use plugbuild_lib::session::Session;

use crate::output::{format_duration, print_artifact, print_failure, print_info, print_stat, print_warning};

/// Execute the build command.
///
/// Returns whether every pipeline placed its artifact. One line is printed
/// per placed artifact and per failed target.
pub fn cmd_build(session: &Session) -> Result<bool> {
  let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
  let started = Instant::now();
  debug!(jobs = session.parallelism(), targets = session.targets.len(), "starting build");

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(async {
      let metadata = session.metadata(Arc::clone(&runner)).await;
      print_info(&format!("Building {} ({metadata})", session.variant.facet));
      let translator = session.translator(Arc::clone(&runner));
      session.build(Arc::clone(&runner), translator, metadata).await
    })
    .context("Build failed")?;

  println!();
  for (pipeline, artifact) in &report.placed {
    print_artifact(pipeline, &artifact.output_path);
  }
  for (pipeline, failure) in &report.failures {
    print_failure(&pipeline.target, &failure.stage.kind, &failure.error);
  }
  if !report.skipped.is_empty() {
    print_warning(&format!("{} stage(s) skipped after failures", report.skipped.len()));
  }

  print_stat("Units compiled", &report.compiled_units().to_string());
  print_stat("Libraries linked", &report.relinked().to_string());
  if session.config.tests.enabled {
    print_stat("Test runs", &report.tests_run().to_string());
  }
  print_stat("Elapsed", &format_duration(started.elapsed()));

  Ok(report.is_success())
}
