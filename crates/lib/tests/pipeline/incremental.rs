//! Rebuild behaviour across invocations.

use plugbuild_lib::execute::StageOutput;

use super::common::{Fakes, LIVE_PRESETS_HEADER, RESOURCE_SCRIPT, TestProject, metadata};

#[tokio::test]
async fn unchanged_rebuild_does_nothing() {
  let project = TestProject::new();
  let session = project.session(None, &["linux-x64", "windows-x64"]);
  let fakes = Fakes::new();

  let first = fakes.build(&session, metadata("v1")).await;
  assert!(first.is_success());
  assert!(first.compiled_units() > 0);
  assert_eq!(first.relinked(), 2);

  let second = fakes.build(&session, metadata("v1")).await;
  assert!(second.is_success());
  assert_eq!(second.compiled_units(), 0);
  assert_eq!(second.relinked(), 0);
  assert_eq!(second.placed.len(), 2);
}

#[tokio::test]
async fn version_change_recompiles_referencing_units_and_relinks() {
  let project = TestProject::new();
  let session = project.session(None, &["linux-x64", "windows-x64"]);
  let fakes = Fakes::new();

  fakes.build(&session, metadata("v1")).await;
  fakes.runner.clear();

  let report = fakes.build(&session, metadata("v2")).await;
  assert!(report.is_success());
  // One unit per target names BUILD_VERSION.
  assert_eq!(report.compiled_units(), 2);
  assert_eq!(report.relinked(), 2);

  let recompiled: Vec<_> = fakes
    .runner
    .commands()
    .into_iter()
    .filter(|c| c.args.iter().any(|a| a == "-c" || a == "/c"))
    .collect();
  assert_eq!(recompiled.len(), 2);
  assert!(recompiled.iter().all(|c| c.mentions("LivePresetsExtension.cpp")));

  for artifact in report.placed.values() {
    let content = std::fs::read_to_string(&artifact.output_path).unwrap();
    assert!(!content.is_empty());
  }
  assert!(
    report
      .completed
      .values()
      .any(|o| matches!(o, StageOutput::Archived(_)))
  );
}

#[tokio::test]
async fn source_edit_recompiles_only_that_unit() {
  let project = TestProject::new();
  let session = project.session(None, &["linux-x64"]);
  let fakes = Fakes::new();
  fakes.build(&session, metadata("v1")).await;

  project.write("src/main/cpp/Presets/Preset.cpp", "int preset() { return 2; }\n");
  let report = fakes.build(&session, metadata("v1")).await;
  assert_eq!(report.compiled_units(), 1);
  assert_eq!(report.relinked(), 1);
}

#[tokio::test]
async fn header_edit_recompiles_including_units_and_relinks() {
  let project = TestProject::new();
  let session = project.session(None, &["linux-x64"]);
  let fakes = Fakes::new();
  fakes.build(&session, metadata("v1")).await;
  fakes.runner.clear();

  project.write(
    "src/main/headers/LivePresets.h",
    &format!("{LIVE_PRESETS_HEADER}int preset();\n"),
  );
  let report = fakes.build(&session, metadata("v1")).await;
  assert!(report.is_success());
  assert_eq!(report.compiled_units(), 1);
  assert_eq!(report.relinked(), 1);
  assert_eq!(fakes.runner.commands_mentioning("Preset.cpp").len(), 1);
}

#[tokio::test]
async fn dialog_edit_recompiles_units_including_translated_resources() {
  let project = TestProject::new();
  let session = project.session(None, &["linux-x64"]);
  let fakes = Fakes::new();
  fakes.build(&session, metadata("v1")).await;

  project.write(
    "src/main/headers/resources/resource.rc",
    &RESOURCE_SCRIPT.replace("320, 200", "400, 240"),
  );
  let report = fakes.build(&session, metadata("v1")).await;
  assert!(report.is_success());
  assert_eq!(report.compiled_units(), 1);
  assert_eq!(report.relinked(), 1);

  let unchanged = fakes.build(&session, metadata("v1")).await;
  assert_eq!(unchanged.compiled_units(), 0);
  assert_eq!(unchanged.relinked(), 0);
}

#[tokio::test]
async fn removed_header_forces_rebuild_of_its_includers() {
  let project = TestProject::new();
  let session = project.session(None, &["linux-x64"]);
  let fakes = Fakes::new();
  project.write("src/main/headers/Extra.h", "#pragma once\n");
  project.write(
    "src/main/cpp/Presets/Preset.cpp",
    "#include \"LivePresets.h\"\n#include \"Extra.h\"\nint preset() { return 0; }\n",
  );
  fakes.build(&session, metadata("v1")).await;

  std::fs::remove_file(project.root().join("src/main/headers/Extra.h")).unwrap();
  let report = fakes.build(&session, metadata("v1")).await;
  assert_eq!(report.compiled_units(), 1);
}
