//! One build invocation: settings layered from flags, environment and file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::consts::FACET_ENV;
use crate::execute::{BuildPlan, BuildReport, ExecuteContext, ExecuteError, PlanRequest, execute_plan};
use crate::metadata::{BuildMetadata, GitDescribe};
use crate::platform::BuildTarget;
use crate::project::Project;
use crate::resources::{ResourceTranslator, SubprocessTranslator};
use crate::runner::CommandRunner;
use crate::target::enumerate_targets;
use crate::variant::{Variant, select_variant};

/// Settings given on the command line; each one overrides its config key.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
  pub config_path: Option<PathBuf>,
  pub facet: Option<String>,
  pub targets: Vec<String>,
  pub jobs: Option<usize>,
  /// Build the unit-test executable regardless of the config file.
  pub tests: bool,
}

#[derive(Debug, Clone)]
pub struct Session {
  pub project: Project,
  pub config: Config,
  pub targets: Vec<BuildTarget>,
  pub variant: Variant,
}

impl Session {
  pub fn open(root: &Path, overrides: &Overrides) -> Result<Self, ConfigError> {
    let root = dunce::canonicalize(root).map_err(|source| ConfigError::Read {
      path: root.to_path_buf(),
      source,
    })?;
    let config = Config::load(&root, overrides.config_path.as_deref())?;
    Self::with_config(root, config, overrides)
  }

  /// Apply `overrides` and the environment on top of `config`.
  pub fn with_config(root: impl Into<PathBuf>, mut config: Config, overrides: &Overrides) -> Result<Self, ConfigError> {
    let env_facet = std::env::var(FACET_ENV).ok().filter(|v| !v.is_empty());
    if let Some(facet) = overrides.facet.clone().or(env_facet) {
      config.facet = Some(facet);
    }
    if !overrides.targets.is_empty() {
      config.targets = overrides.targets.clone();
    }
    if overrides.jobs.is_some() {
      config.parallelism = overrides.jobs;
    }
    if overrides.tests {
      config.tests.enabled = true;
    }
    config.parallelism()?;

    let project = Project::new(root, &config);
    let targets = enumerate_targets(&config.targets)?;
    let variant = select_variant(config.facet.as_deref(), &project.layout)?;
    debug!(
      facet = %variant.facet,
      targets = targets.len(),
      root = %project.root.display(),
      "opened session"
    );

    Ok(Self {
      project,
      config,
      targets,
      variant,
    })
  }

  pub fn parallelism(&self) -> usize {
    self.config.parallelism().unwrap_or(1)
  }

  /// Query the version control system once for this invocation.
  pub async fn metadata(&self, runner: Arc<dyn CommandRunner>) -> Arc<BuildMetadata> {
    let query = GitDescribe::new(runner, self.config.vcs.program.as_deref(), &self.project.root);
    BuildMetadata::acquire(&query).await
  }

  pub fn plan(&self, metadata: Arc<BuildMetadata>) -> Result<BuildPlan, ExecuteError> {
    BuildPlan::new(PlanRequest {
      project: &self.project,
      config: &self.config,
      targets: &self.targets,
      variant: &self.variant,
      metadata,
    })
  }

  /// The configured subprocess translator.
  pub fn translator(&self, runner: Arc<dyn CommandRunner>) -> Arc<dyn ResourceTranslator> {
    Arc::new(SubprocessTranslator::from_config(
      runner,
      &self.config.translator,
      &self.project,
    ))
  }

  /// Plan and execute with the given collaborators.
  pub async fn build(
    &self,
    runner: Arc<dyn CommandRunner>,
    translator: Arc<dyn ResourceTranslator>,
    metadata: Arc<BuildMetadata>,
  ) -> Result<BuildReport, ExecuteError> {
    let plan = self.plan(metadata)?;
    let ctx = ExecuteContext::new(runner, translator, self.parallelism());
    execute_plan(&plan, &ctx).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::{Arch, Os};
  use crate::variant::Facet;
  use serial_test::serial;

  fn config(toml: &str) -> Config {
    Config::from_toml_str(toml).unwrap()
  }

  #[test]
  #[serial]
  fn flag_beats_environment_and_file() {
    temp_env::with_var(FACET_ENV, Some("base"), || {
      let overrides = Overrides {
        facet: Some("ultimate".to_string()),
        ..Overrides::default()
      };
      let session = Session::with_config("/p", config("facet = \"base\""), &overrides).unwrap();
      assert_eq!(session.variant.facet, Facet::Extended);
    });
  }

  #[test]
  #[serial]
  fn environment_beats_file() {
    temp_env::with_var(FACET_ENV, Some("extended"), || {
      let session = Session::with_config("/p", config("facet = \"base\""), &Overrides::default()).unwrap();
      assert_eq!(session.variant.facet, Facet::Extended);
    });
  }

  #[test]
  #[serial]
  fn file_facet_applies_without_overrides() {
    temp_env::with_var_unset(FACET_ENV, || {
      let session = Session::with_config("/p", config("facet = \"ultimate\""), &Overrides::default()).unwrap();
      assert_eq!(session.variant.facet, Facet::Extended);
    });
  }

  #[test]
  #[serial]
  fn target_flags_replace_config_targets() {
    temp_env::with_var_unset(FACET_ENV, || {
      let overrides = Overrides {
        targets: vec!["windows-x86".to_string()],
        ..Overrides::default()
      };
      let session = Session::with_config("/p", config("targets = [\"linux-x64\"]"), &overrides).unwrap();
      assert_eq!(session.targets, vec![BuildTarget::new(Os::Windows, Arch::X86)]);
    });
  }

  #[test]
  #[serial]
  fn zero_jobs_is_rejected() {
    temp_env::with_var_unset(FACET_ENV, || {
      let overrides = Overrides {
        jobs: Some(0),
        ..Overrides::default()
      };
      let err = Session::with_config("/p", Config::default(), &overrides).unwrap_err();
      assert!(matches!(err, ConfigError::InvalidParallelism));
    });
  }

  #[test]
  #[serial]
  fn tests_flag_enables_unit_tests() {
    temp_env::with_var_unset(FACET_ENV, || {
      let overrides = Overrides {
        tests: true,
        ..Overrides::default()
      };
      let session = Session::with_config("/p", config("[tests]\nrun = false"), &overrides).unwrap();
      assert!(session.config.tests.enabled);
      assert!(!session.config.tests.run);
    });
  }
}
