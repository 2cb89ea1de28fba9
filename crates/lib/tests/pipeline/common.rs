//! Shared helpers for pipeline tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use plugbuild_lib::config::Config;
use plugbuild_lib::execute::BuildReport;
use plugbuild_lib::metadata::BuildMetadata;
use plugbuild_lib::project::Project;
use plugbuild_lib::resources::InMemoryTranslator;
use plugbuild_lib::runner::RecordingRunner;
use plugbuild_lib::session::{Overrides, Session};
use plugbuild_lib::sources::{SourceTree, resolve};
use plugbuild_lib::target::SUPPORTED_TARGETS;
use plugbuild_lib::variant::{Facet, Variant};
use tempfile::TempDir;

pub const RESOURCE_SCRIPT: &str = "\
IDD_PRESETS DIALOGEX 0, 0, 320, 200
IDR_CONTEXT MENU
BEGIN
  MENUITEM \"Recall\", 1001
END
";

pub const LIVE_PRESETS_HEADER: &str = "\
#pragma once
#ifndef _WIN32
#include \"resource.rc_mac_dlg\"
#endif
";

/// A project tree with plugin, extended and foundation sources.
pub struct TestProject {
  pub temp: TempDir,
}

impl TestProject {
  pub fn new() -> Self {
    let project = Self {
      temp: TempDir::new().unwrap(),
    };
    project.write("src/main/cpp/LivePresetsExtension.cpp", "const char* v = BUILD_VERSION;\n");
    project.write(
      "src/main/cpp/Presets/Preset.cpp",
      "#include \"LivePresets.h\"\nint preset() { return 0; }\n",
    );
    project.write("src/main/headers/LivePresets.h", LIVE_PRESETS_HEADER);
    project.write("src/main/headers/resources/resource.rc", RESOURCE_SCRIPT);
    project.write("src/main/LPE-U/cpp/Ultimate.cpp", "int ultimate() { return 1; }\n");
    project.write("src/main/LPE-U/headers/Ultimate.h", "#pragma once\n");
    project.write_foundation();
    project
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn home(&self) -> PathBuf {
    self.root().join("home")
  }

  pub fn write(&self, relative: &str, content: &str) {
    let path = self.root().join(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
  }

  /// Create every foundation source any target compiles.
  fn write_foundation(&self) {
    let project = Project::new(self.root(), &Config::default());
    let tree = SourceTree::default();
    for facet in [Facet::Base, Facet::Extended] {
      let variant = Variant::for_facet(facet, &project.layout).unwrap();
      for target in SUPPORTED_TARGETS {
        for unit in resolve(target, &variant, &tree, &project).unwrap().units {
          if !unit.source.exists() {
            std::fs::create_dir_all(unit.source.parent().unwrap()).unwrap();
            std::fs::write(&unit.source, "/* foundation */\n").unwrap();
          }
        }
      }
    }
  }

  pub fn config(&self) -> Config {
    Config {
      home_dir: Some(self.home()),
      ..Config::default()
    }
  }

  pub fn session(&self, facet: Option<&str>, targets: &[&str]) -> Session {
    let overrides = Overrides {
      facet: facet.map(str::to_string),
      targets: targets.iter().map(|t| t.to_string()).collect(),
      jobs: Some(4),
      ..Overrides::default()
    };
    Session::with_config(self.root(), self.config(), &overrides).unwrap()
  }
}

pub fn metadata(version: &str) -> Arc<BuildMetadata> {
  Arc::new(BuildMetadata::new(version, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()))
}

/// Collaborators for one build run.
pub struct Fakes {
  pub runner: Arc<RecordingRunner>,
  pub translator: Arc<InMemoryTranslator>,
}

impl Fakes {
  pub fn new() -> Self {
    Self {
      runner: Arc::new(RecordingRunner::new()),
      translator: Arc::new(InMemoryTranslator::new()),
    }
  }

  pub async fn build(&self, session: &Session, metadata: Arc<BuildMetadata>) -> BuildReport {
    session
      .build(self.runner.clone(), self.translator.clone(), metadata)
      .await
      .unwrap()
  }
}
