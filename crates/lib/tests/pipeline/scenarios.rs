//! End-to-end build scenarios.

use std::sync::Arc;

use plugbuild_lib::config::{ConfigError, TestConfig};
use plugbuild_lib::consts::{BUILD_VERSION_MACRO, EXTENDED_MACRO};
use plugbuild_lib::execute::{Stage, StageError, StageId, StageKind};
use plugbuild_lib::platform::{Arch, BuildTarget, Os};
use plugbuild_lib::project::PipelineId;
use plugbuild_lib::runner::RecordingRunner;
use plugbuild_lib::session::{Overrides, Session};
use plugbuild_lib::sources::{Component, Language};
use plugbuild_lib::variant::Facet;

use super::common::{Fakes, TestProject, metadata};

const LINUX: BuildTarget = BuildTarget::new(Os::Linux, Arch::X64);
const MACOS: BuildTarget = BuildTarget::new(Os::MacOs, Arch::X64);

#[tokio::test]
async fn linux_base_build() {
  let project = TestProject::new();
  let session = project.session(None, &["linux-x64"]);
  let plan = session.plan(metadata("v1.0.0")).unwrap();
  let pipeline = plan.pipeline(PipelineId::new(LINUX, Facet::Base)).unwrap();

  for unit in pipeline
    .resolution
    .units
    .iter()
    .filter(|u| u.component == Component::Foundation)
  {
    assert_eq!(unit.macros.value("SWELL_TARGET_GDK"), Some(Some("3")));
    assert_eq!(unit.macros.value("NOMINMAX"), Some(None));
    assert_eq!(unit.macros.value("SWELL_PROVIDED_BY_APP"), Some(None));
  }
  assert!(!pipeline.resolution.has_units(Language::ObjCpp));
  let objcpp = StageId::new(pipeline.id, StageKind::CompileObjCpp);
  assert!(plan.stage(&objcpp).is_none());

  let fakes = Fakes::new();
  let report = fakes.build(&session, metadata("v1.0.0")).await;
  assert!(report.is_success(), "failures: {:?}", report.failures);

  let expected = project
    .home()
    .join(".config/REAPER/UserPlugins/reaper_livepresets_ce_x64.so");
  assert_eq!(report.placed[&pipeline.id].output_path, expected);
  assert!(expected.exists());

  let shim = fakes.runner.commands_mentioning("swell-modstub-generic.cpp");
  assert_eq!(shim.len(), 1);
  assert!(shim[0].args.contains(&"-DSWELL_TARGET_GDK=3".to_string()));
  assert!(shim[0].args.contains(&"-fPIC".to_string()));
}

#[tokio::test]
async fn macos_extended_build() {
  let project = TestProject::new();
  let session = project.session(Some("ultimate"), &["macos-x64"]);
  let plan = session.plan(metadata("v1.0.0")).unwrap();
  let id = PipelineId::new(MACOS, Facet::Extended);

  let objcpp = plan.stage(&StageId::new(id, StageKind::CompileObjCpp)).unwrap();
  let Stage::Compile(stage) = objcpp.as_ref() else {
    panic!("expected a compile stage");
  };
  assert_eq!(stage.units.len(), 7);
  assert!(stage.units.iter().all(|u| u.source.extension().unwrap() == "mm"));
  assert!(stage.units.iter().all(|u| u.macros.contains(EXTENDED_MACRO)));

  let fakes = Fakes::new();
  let report = fakes.build(&session, metadata("v1.0.0")).await;
  assert!(report.is_success(), "failures: {:?}", report.failures);
  assert_eq!(fakes.translator.invocations(), 1);

  let res_dir = plan.pipeline(id).unwrap().partition.resource_dir();
  let mut relocated: Vec<_> = std::fs::read_dir(&res_dir)
    .unwrap()
    .map(|e| e.unwrap().file_name().into_string().unwrap())
    .collect();
  relocated.sort();
  assert_eq!(relocated, vec!["resource.rc_mac_dlg", "resource.rc_mac_menu"]);

  let ultimate = fakes.runner.commands_mentioning("Ultimate.cpp");
  assert_eq!(ultimate.len(), 1);
  assert!(ultimate[0].args.contains(&format!("-D{EXTENDED_MACRO}")));

  let link = fakes.runner.commands_mentioning("-dynamiclib");
  assert_eq!(link.len(), 1);
  assert!(link[0].args.windows(2).any(|w| w == ["-framework", "AppKit"]));

  let placed = &report.placed[&id];
  assert!(
    placed
      .output_path
      .ends_with("Library/Application Support/REAPER/UserPlugins/reaper_livepresets_ultimate_x64.dylib")
  );
  assert!(placed.embedded_macros.contains(EXTENDED_MACRO));
}

#[tokio::test]
async fn version_query_failure_still_builds() {
  let project = TestProject::new();
  let session = project.session(None, &["linux-x64"]);

  let vcs = Arc::new(RecordingRunner::new());
  vcs.fail_when("describe");
  let meta = session.metadata(vcs).await;
  assert_eq!(meta.version, "");

  let fakes = Fakes::new();
  let report = fakes.build(&session, meta).await;
  assert!(report.is_success());

  let artifact = report.placed.values().next().unwrap();
  assert_eq!(artifact.embedded_macros.value(BUILD_VERSION_MACRO), Some(Some("\"\"")));
  let main = fakes.runner.commands_mentioning("LivePresetsExtension.cpp");
  assert!(main[0].args.contains(&format!("-D{BUILD_VERSION_MACRO}=\"\"")));
}

#[tokio::test]
async fn unknown_facet_builds_base() {
  let project = TestProject::new();
  let session = project.session(Some("platinum"), &["linux-x64"]);
  assert_eq!(session.variant.facet, Facet::Base);

  let fakes = Fakes::new();
  let report = fakes.build(&session, metadata("v1")).await;
  assert!(report.is_success());
  assert!(report.placed.contains_key(&PipelineId::new(LINUX, Facet::Base)));
  assert!(fakes.runner.commands_mentioning("Ultimate.cpp").is_empty());
}

#[tokio::test]
async fn failing_target_keeps_sibling_artifacts() {
  let project = TestProject::new();
  let session = project.session(None, &[]);
  let fakes = Fakes::new();
  fakes.runner.fail_when("swell-gdi.mm");

  let report = fakes.build(&session, metadata("v1")).await;
  assert!(!report.is_success());
  assert_eq!(report.failures.len(), 1);

  let mac = PipelineId::new(MACOS, Facet::Base);
  let failure = &report.failures[&mac];
  assert_eq!(failure.stage.kind, StageKind::CompileObjCpp);
  assert!(matches!(failure.error, StageError::Compile(_)));
  assert!(report.skipped.contains_key(&StageId::new(mac, StageKind::Link)));
  assert!(!report.placed.contains_key(&mac));
  assert_eq!(report.placed.len(), 3);
  for artifact in report.placed.values() {
    assert!(artifact.output_path.exists());
  }
}

#[tokio::test]
async fn windows_links_compiled_resources_and_system_libraries() {
  let project = TestProject::new();
  let session = project.session(None, &["windows-x86"]);
  let fakes = Fakes::new();
  let report = fakes.build(&session, metadata("v1")).await;
  assert!(report.is_success(), "failures: {:?}", report.failures);
  assert_eq!(fakes.translator.invocations(), 0);

  let rc = fakes.runner.commands_mentioning("resource.rc");
  assert_eq!(rc.len(), 1);
  assert_eq!(rc[0].program, "rc");

  let link = fakes.runner.commands_mentioning("/DLL");
  assert_eq!(link.len(), 1);
  assert!(link[0].args.contains(&"/MACHINE:X86".to_string()));
  assert!(link[0].args.iter().any(|a| a.ends_with("resource.res")));
  for lib in ["user32.lib", "gdi32.lib", "advapi32.lib", "shell32.lib", "comdlg32.lib"] {
    assert!(link[0].args.contains(&lib.to_string()), "missing {lib}");
  }
  assert_eq!(fakes.runner.commands_mentioning("win32_utf8.c").len(), 1);
  assert!(fakes.runner.commands_mentioning("swell").is_empty());
}

#[test]
fn unknown_target_is_rejected_before_planning() {
  let project = TestProject::new();
  let overrides = Overrides {
    targets: vec!["solaris-x64".to_string()],
    ..Overrides::default()
  };
  let err = Session::with_config(project.root(), project.config(), &overrides).unwrap_err();
  assert!(matches!(err, ConfigError::UnknownTarget(t) if t == "solaris-x64"));
}

#[tokio::test]
async fn unit_test_executable_links_plugin_and_framework() {
  let project = TestProject::new();
  project.write("src/test/cpp/utils_test.cpp", "#include \"gtest/gtest.h\"\n#include \"LivePresets.h\"\n");
  project.write("third_party/googletest/lib/libgtest_main.a", "archive");
  let mut config = project.config();
  config.tests = TestConfig {
    enabled: true,
    run: true,
    include_dirs: vec!["third_party/googletest/include".into()],
    archives: vec!["third_party/googletest/lib/libgtest_main.a".into()],
  };
  let overrides = Overrides {
    targets: vec!["linux-x64".to_string(), "windows-x86".to_string()],
    jobs: Some(4),
    ..Overrides::default()
  };
  let session = Session::with_config(project.root(), config, &overrides).unwrap();
  let fakes = Fakes::new();

  let report = fakes.build(&session, metadata("v1")).await;
  assert!(report.is_success(), "failures: {:?}", report.failures);

  let links: Vec<_> = fakes
    .runner
    .commands_mentioning("libgtest_main.a")
    .into_iter()
    .filter(|c| c.mentions("utils_test"))
    .collect();
  assert_eq!(links.len(), 1);
  let link = &links[0];
  assert!(link.args.contains(&"-lpthread".to_string()));
  assert!(!link.args.contains(&"-shared".to_string()));
  assert!(link.mentions("LivePresetsExtension.o"));
  assert!(fakes.runner.commands_mentioning("unit_tests.exe").is_empty());

  let compile = fakes.runner.commands_mentioning("utils_test.cpp");
  assert_eq!(compile.len(), 1);
  assert!(compile[0].args.contains(&"-std=c++17".to_string()));
  assert!(compile[0].args.iter().any(|a| a.ends_with("third_party/googletest/include")));

  let on_linux_host = BuildTarget::current() == Some(LINUX);
  assert_eq!(report.tests_run(), usize::from(on_linux_host));

  let again = fakes.build(&session, metadata("v1")).await;
  assert_eq!(again.tests_run(), 0);
  assert_eq!(again.compiled_units(), 0);
}
