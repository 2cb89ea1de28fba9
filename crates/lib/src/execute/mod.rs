//! Build execution.
//!
//! This module provides the entry point for running a [`BuildPlan`]:
//! - dependency-driven scheduling over the stage graph
//! - parallel execution of independent stages across pipelines
//! - failure isolation: a failed stage skips only its own dependents

pub mod dag;
pub mod plan;
pub mod types;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::resources::ResourceTranslator;
use crate::runner::CommandRunner;

pub use dag::StageGraph;
pub use plan::{BuildPlan, PipelinePlan, PlanRequest, Stage, plugin_root, verify_partitions};
pub use types::{BuildReport, ExecuteError, StageError, StageFailure, StageId, StageKind, StageOutput};

/// Collaborators shared by every running stage.
#[derive(Clone)]
pub struct ExecuteContext {
  pub runner: Arc<dyn CommandRunner>,
  pub translator: Arc<dyn ResourceTranslator>,
  semaphore: Arc<Semaphore>,
}

impl ExecuteContext {
  /// `parallelism` bounds the number of concurrently running tools.
  pub fn new(runner: Arc<dyn CommandRunner>, translator: Arc<dyn ResourceTranslator>, parallelism: usize) -> Self {
    Self {
      runner,
      translator,
      semaphore: Arc::new(Semaphore::new(parallelism.max(1))),
    }
  }
}

impl fmt::Debug for ExecuteContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecuteContext")
      .field("runner", &self.runner)
      .field("translator", &self.translator)
      .field("permits", &self.semaphore.available_permits())
      .finish()
  }
}

/// Execute every stage of a plan.
///
/// A stage starts as soon as its last dependency succeeds, so pipelines never
/// wait on each other. A failed stage records one failure for its pipeline
/// and marks its transitive dependents as skipped; other pipelines continue.
pub async fn execute_plan(plan: &BuildPlan, ctx: &ExecuteContext) -> Result<BuildReport, ExecuteError> {
  plan.graph.verify_acyclic()?;
  info!(
    pipelines = plan.pipelines.len(),
    stages = plan.graph.len(),
    "starting build execution"
  );

  let mut report = BuildReport {
    pipelines: plan.pipeline_ids(),
    ..BuildReport::default()
  };
  let mut waiting: HashMap<StageId, usize> = plan
    .graph
    .stages()
    .map(|id| (*id, plan.graph.dependencies(id).len()))
    .collect();
  let mut ready: Vec<StageId> = waiting.iter().filter(|(_, n)| **n == 0).map(|(id, _)| *id).collect();
  ready.sort();

  let mut join_set = JoinSet::new();
  let mut running: HashMap<task::Id, StageId> = HashMap::new();

  loop {
    for id in ready.drain(..) {
      waiting.remove(&id);
      let Some(stage) = plan.stage(&id).cloned() else {
        return Err(ExecuteError::UnknownStage(id));
      };
      debug!(stage = %id, "starting stage");
      let ctx = ctx.clone();
      let handle = join_set.spawn(async move {
        let result = run_stage(stage, ctx).await;
        (id, result)
      });
      running.insert(handle.id(), id);
    }

    let Some(joined) = join_set.join_next_with_id().await else {
      break;
    };
    let (id, result) = match joined {
      Ok((task_id, pair)) => {
        running.remove(&task_id);
        pair
      }
      Err(e) => {
        let Some(id) = running.remove(&e.id()) else {
          error!(error = %e, "untracked stage task failed");
          continue;
        };
        (id, Err(StageError::Task(e.to_string())))
      }
    };

    match result {
      Ok(output) => {
        debug!(stage = %id, "stage succeeded");
        if let StageOutput::Placed(artifact) = &output {
          report.placed.insert(id.pipeline, artifact.clone());
        }
        report.completed.insert(id, output);
        for dependent in plan.graph.dependents(&id) {
          if let Some(count) = waiting.get_mut(&dependent) {
            *count -= 1;
            if *count == 0 {
              ready.push(dependent);
            }
          }
        }
      }
      Err(e) => {
        error!(stage = %id, target = %id.pipeline.target, error = %e, "stage failed");
        report.record_failure(StageFailure { stage: id, error: e });
        skip_dependents(plan, id, &mut waiting, &mut report);
      }
    }
  }

  info!(
    placed = report.placed.len(),
    failed = report.failures.len(),
    skipped = report.skipped.len(),
    "build execution complete"
  );

  Ok(report)
}

/// Mark every stage downstream of `failed` as skipped.
///
/// Each skipped stage records the dependency that actually blocked it.
fn skip_dependents(plan: &BuildPlan, failed: StageId, waiting: &mut HashMap<StageId, usize>, report: &mut BuildReport) {
  let mut pending = vec![failed];
  while let Some(blocked_by) = pending.pop() {
    for dependent in plan.graph.dependents(&blocked_by) {
      if waiting.remove(&dependent).is_some() {
        warn!(stage = %dependent, failed_dep = %blocked_by, "skipping stage due to failed dependency");
        report.skipped.insert(dependent, blocked_by);
        pending.push(dependent);
      }
    }
  }
}

async fn run_stage(stage: Arc<Stage>, ctx: ExecuteContext) -> Result<StageOutput, StageError> {
  match stage.as_ref() {
    // Compile stages take one permit per unit.
    Stage::Compile(compile) => {
      let outcome = compile.run(Arc::clone(&ctx.runner), Arc::clone(&ctx.semaphore)).await?;
      Ok(StageOutput::Compiled(outcome))
    }
    Stage::Resources(resources) => {
      let _permit = acquire(&ctx).await?;
      let artifacts = resources.run(ctx.translator.as_ref(), ctx.runner.as_ref()).await?;
      Ok(StageOutput::Resources(artifacts))
    }
    Stage::Archive(archive) => {
      let _permit = acquire(&ctx).await?;
      Ok(StageOutput::Archived(archive.run(ctx.runner.as_ref()).await?))
    }
    Stage::Link(link) => {
      let _permit = acquire(&ctx).await?;
      Ok(StageOutput::Linked(link.run(ctx.runner.as_ref()).await?))
    }
    Stage::Place(place) => Ok(StageOutput::Placed(place.run().await?)),
    Stage::TestLink(link) => {
      let _permit = acquire(&ctx).await?;
      Ok(StageOutput::TestLinked(link.run(ctx.runner.as_ref()).await?))
    }
    Stage::TestRun(run) => {
      let _permit = acquire(&ctx).await?;
      Ok(StageOutput::Tested(run.run(ctx.runner.as_ref()).await?))
    }
  }
}

async fn acquire(ctx: &ExecuteContext) -> Result<tokio::sync::SemaphorePermit<'_>, StageError> {
  ctx
    .semaphore
    .acquire()
    .await
    .map_err(|e| StageError::Task(e.to_string()))
}
