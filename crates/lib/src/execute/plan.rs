//! Build planning.
//!
//! A plan holds one pipeline per requested target. Each pipeline is composed
//! once, its primary compile configuration stamped with the build metadata,
//! and its stages wired into a single [`StageGraph`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::compile::{CompileStage, StageConfig};
use crate::config::{Config, ConfigError};
use crate::link::{ArchiveStage, FOUNDATION_ARCHIVE_STEM, LinkStage, PlaceStage, artifact_file_name};
use crate::metadata::BuildMetadata;
use crate::platform::{Arch, BuildTarget, Os, paths};
use crate::project::{Partition, PipelineId, Project};
use crate::resources::ResourceStage;
use crate::sources::{Component, CompileUnit, Language, Resolution, SourceTree, resolve, scan_test_sources};
use crate::toolchain::Toolset;
use crate::unit_test::{self, TestLinkStage, TestRunStage};
use crate::variant::Variant;

use super::dag::StageGraph;
use super::types::{ExecuteError, StageId, StageKind};

/// A runnable stage.
#[derive(Debug, Clone)]
pub enum Stage {
  Compile(CompileStage),
  Resources(ResourceStage),
  Archive(ArchiveStage),
  Link(LinkStage),
  Place(PlaceStage),
  TestLink(TestLinkStage),
  TestRun(TestRunStage),
}

/// Everything planned for one (target, variant).
#[derive(Debug, Clone)]
pub struct PipelinePlan {
  pub id: PipelineId,
  pub partition: Partition,
  pub resolution: Resolution,
  pub config: Arc<StageConfig>,
  pub artifact_path: PathBuf,
  /// Unit-test executable, when tests are built for this target.
  pub test_executable: Option<PathBuf>,
}

/// Inputs to [`BuildPlan::new`].
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
  pub project: &'a Project,
  pub config: &'a Config,
  pub targets: &'a [BuildTarget],
  pub variant: &'a Variant,
  pub metadata: Arc<BuildMetadata>,
}

#[derive(Debug, Clone)]
pub struct BuildPlan {
  pub pipelines: Vec<PipelinePlan>,
  pub graph: StageGraph,
  pub stages: HashMap<StageId, Arc<Stage>>,
  pub metadata: Arc<BuildMetadata>,
}

/// Plugin directory root for `os`: the configured override or the host
/// convention under the user's home.
pub fn plugin_root(config: &Config, os: Os) -> Result<PathBuf, ConfigError> {
  match &config.plugin_dir {
    Some(dir) => Ok(dir.clone()),
    None => Ok(paths::plugin_dir(os, &config.resolve_home()?)),
  }
}

/// Fail if any two pipelines share an output directory.
pub fn verify_partitions(pipelines: &[PipelinePlan]) -> Result<(), ConfigError> {
  let mut owners: HashMap<PathBuf, PipelineId> = HashMap::new();
  for pipeline in pipelines {
    for dir in pipeline.partition.all_dirs() {
      if let Some(first) = owners.insert(dir.clone(), pipeline.id)
        && first != pipeline.id
      {
        return Err(ConfigError::PartitionCollision {
          dir,
          first: first.to_string(),
          second: pipeline.id.to_string(),
        });
      }
    }
  }
  Ok(())
}

struct PlanBuilder {
  graph: StageGraph,
  stages: HashMap<StageId, Arc<Stage>>,
}

impl PlanBuilder {
  fn add(&mut self, id: StageId, stage: Stage) {
    self.graph.add_stage(id);
    self.stages.insert(id, Arc::new(stage));
  }
}

impl BuildPlan {
  pub fn new(request: PlanRequest<'_>) -> Result<Self, ExecuteError> {
    let PlanRequest {
      project,
      config,
      targets,
      variant,
      metadata,
    } = request;

    let tree = SourceTree::discover(project, variant)?;
    debug!(plugin = tree.plugin.len(), variant = tree.variant.len(), "discovered sources");
    let test_sources = if config.tests.enabled {
      scan_test_sources(project)?
    } else {
      Vec::new()
    };

    let mut builder = PlanBuilder {
      graph: StageGraph::new(),
      stages: HashMap::new(),
    };
    let mut pipelines = Vec::with_capacity(targets.len());

    for &target in targets {
      let id = PipelineId::new(target, variant.facet);
      let partition = project.partition(id);
      let resolution = resolve(target, variant, &tree, project)?;
      let toolset = Toolset::new(target, config.toolchain.for_os(target.os));

      let mut stage_config = StageConfig::from_resolution(toolset, &resolution, &project.root);
      if target.os.is_unix() {
        stage_config.add_include(partition.resource_dir());
      }
      stage_config.stamp(&metadata)?;

      let file_name = artifact_file_name(&project.product, variant.facet, target.os, target.arch);
      let artifact_path = plugin_root(config, target.os)?.join(&file_name);

      let units = |language: Language| -> Vec<CompileUnit> { resolution.units_for(language).cloned().collect() };
      let primary = CompileStage::primary(stage_config, units(Language::Cpp), partition.object_dir(Language::Cpp));
      let mut compile = vec![(StageKind::CompileCpp, primary.clone())];
      for (kind, language) in [(StageKind::CompileC, Language::C), (StageKind::CompileObjCpp, Language::ObjCpp)] {
        if resolution.has_units(language) {
          compile.push((kind, primary.derive(language, units(language), partition.object_dir(language))));
        }
      }
      let config_arc = Arc::clone(&primary.config);

      let stage_id = |kind| StageId::new(id, kind);
      let resources_id = stage_id(StageKind::Resources);
      let link_id = stage_id(StageKind::Link);
      let place_id = stage_id(StageKind::Place);

      builder.add(
        resources_id,
        Stage::Resources(ResourceStage {
          toolset: config_arc.toolset.clone(),
          script: project.resource_script(),
          include_dirs: resolution.include_dirs.clone(),
          staging_dir: partition.staging_dir(),
          resource_dir: partition.resource_dir(),
        }),
      );

      let mut plugin_objects = Vec::new();
      let mut foundation_objects = Vec::new();
      for (_, stage) in &compile {
        for (unit, object) in stage.units.iter().zip(stage.object_paths()) {
          match unit.component {
            Component::Plugin => plugin_objects.push(object),
            Component::Foundation => foundation_objects.push(object),
            Component::Test => {}
          }
        }
      }

      let compile_ids: Vec<StageId> = compile.iter().map(|(kind, _)| stage_id(*kind)).collect();
      for (kind, stage) in compile {
        builder.add(stage_id(kind), Stage::Compile(stage));
      }

      let mut archives = Vec::new();
      let mut archive_id = None;
      if let Some(prebuilt) = &project.prebuilt_foundation {
        archives.push(prebuilt.clone());
      } else {
        let output = partition
          .lib_dir()
          .join(config_arc.toolset.toolchain.static_lib_name(FOUNDATION_ARCHIVE_STEM));
        archives.push(output.clone());
        let aid = stage_id(StageKind::Archive);
        builder.add(
          aid,
          Stage::Archive(ArchiveStage {
            toolset: config_arc.toolset.clone(),
            objects: foundation_objects,
            output,
          }),
        );
        archive_id = Some(aid);
      }

      let link_output = partition.lib_dir().join(&file_name);
      builder.add(
        link_id,
        Stage::Link(LinkStage {
          config: Arc::clone(&config_arc),
          objects: plugin_objects.clone(),
          archives: archives.clone(),
          resource_dir: partition.resource_dir(),
          system: resolution.system.clone(),
          output: link_output.clone(),
        }),
      );
      builder.add(
        place_id,
        Stage::Place(PlaceStage {
          library: link_output,
          destination: artifact_path.clone(),
          embedded_macros: config_arc.macros.clone(),
        }),
      );

      // Generated dialog and menu descriptions are included by plugin sources.
      if target.os.is_unix() {
        builder.graph.add_dependency(resources_id, stage_id(StageKind::CompileCpp))?;
      }
      for &cid in &compile_ids {
        if let Some(aid) = archive_id {
          builder.graph.add_dependency(cid, aid)?;
        }
        builder.graph.add_dependency(cid, link_id)?;
      }
      if let Some(aid) = archive_id {
        builder.graph.add_dependency(aid, link_id)?;
      }
      builder.graph.add_dependency(resources_id, link_id)?;
      builder.graph.add_dependency(link_id, place_id)?;

      let mut test_executable = None;
      if config.tests.enabled {
        if target.arch != Arch::X64 {
          debug!(target = %target, "unit tests are built for x64 only, skipping");
        } else if test_sources.is_empty() {
          debug!(target = %target, "no unit test sources");
        } else {
          let mut test_config = (*config_arc).clone();
          // Tests include plugin headers by their path below the sources.
          test_config.add_include(project.path(&project.layout.plugin_sources));
          for dir in &config.tests.include_dirs {
            test_config.add_include(project.path(dir));
          }
          let compile_test = CompileStage::primary(
            test_config,
            unit_test::test_units(&test_sources, &resolution),
            partition.test_object_dir(),
          );
          let mut objects = compile_test.object_paths();
          objects.extend(plugin_objects);
          let mut test_archives = archives;
          test_archives.extend(config.tests.archives.iter().map(|a| project.path(a)));
          let executable = partition.test_bin_dir().join(unit_test::executable_name(target.os));

          let compile_test_id = stage_id(StageKind::CompileTest);
          let link_test_id = stage_id(StageKind::LinkTest);
          builder.add(compile_test_id, Stage::Compile(compile_test));
          builder.add(
            link_test_id,
            Stage::TestLink(TestLinkStage {
              toolset: config_arc.toolset.clone(),
              objects,
              archives: test_archives,
              system: unit_test::system_libraries(&config_arc.toolset, &resolution.system),
              output: executable.clone(),
            }),
          );

          if target.os.is_unix() {
            builder.graph.add_dependency(resources_id, compile_test_id)?;
          }
          builder.graph.add_dependency(compile_test_id, link_test_id)?;
          for &cid in &compile_ids {
            builder.graph.add_dependency(cid, link_test_id)?;
          }
          if let Some(aid) = archive_id {
            builder.graph.add_dependency(aid, link_test_id)?;
          }

          if config.tests.run && BuildTarget::current() == Some(target) {
            let run_test_id = stage_id(StageKind::RunTest);
            builder.add(
              run_test_id,
              Stage::TestRun(TestRunStage {
                executable: executable.clone(),
                cwd: project.root.clone(),
              }),
            );
            builder.graph.add_dependency(link_test_id, run_test_id)?;
          }
          test_executable = Some(executable);
        }
      }

      pipelines.push(PipelinePlan {
        id,
        partition,
        resolution,
        config: config_arc,
        artifact_path,
        test_executable,
      });
    }

    verify_partitions(&pipelines)?;
    builder.graph.verify_acyclic()?;

    info!(
      pipelines = pipelines.len(),
      stages = builder.graph.len(),
      metadata = %metadata,
      "planned build"
    );

    Ok(Self {
      pipelines,
      graph: builder.graph,
      stages: builder.stages,
      metadata,
    })
  }

  pub fn waves(&self) -> Result<Vec<Vec<StageId>>, ExecuteError> {
    self.graph.execution_waves()
  }

  pub fn stage(&self, id: &StageId) -> Option<&Arc<Stage>> {
    self.stages.get(id)
  }

  pub fn pipeline(&self, id: PipelineId) -> Option<&PipelinePlan> {
    self.pipelines.iter().find(|p| p.id == id)
  }

  pub fn pipeline_ids(&self) -> Vec<PipelineId> {
    self.pipelines.iter().map(|p| p.id).collect()
  }
}
