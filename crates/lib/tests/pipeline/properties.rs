//! Property tests for composition and output partitioning.

use std::collections::HashSet;
use std::path::PathBuf;

use plugbuild_lib::config::{BuildType, Config};
use plugbuild_lib::project::{Partition, PipelineId, Project};
use plugbuild_lib::sources::{SourceTree, resolve};
use plugbuild_lib::target::SUPPORTED_TARGETS;
use plugbuild_lib::variant::{Facet, Variant};
use proptest::prelude::*;

fn facet() -> impl Strategy<Value = Facet> {
  prop_oneof![Just(Facet::Base), Just(Facet::Extended)]
}

fn build_type() -> impl Strategy<Value = BuildType> {
  prop_oneof![Just(BuildType::Debug), Just(BuildType::Release)]
}

fn source_tree() -> impl Strategy<Value = SourceTree> {
  (
    prop::collection::vec("[a-z]{1,8}", 0..6),
    prop::collection::vec("[a-z]{1,8}", 0..3),
  )
    .prop_map(|(plugin, extra)| SourceTree {
      plugin: plugin
        .into_iter()
        .map(|n| PathBuf::from(format!("/p/src/main/cpp/{n}.cpp")))
        .collect(),
      variant: extra
        .into_iter()
        .map(|n| PathBuf::from(format!("/p/src/main/LPE-U/cpp/{n}.cpp")))
        .collect(),
    })
}

proptest! {
  #[test]
  fn composition_is_deterministic(
    target_idx in 0..SUPPORTED_TARGETS.len(),
    facet in facet(),
    tree in source_tree(),
  ) {
    let project = Project::new("/p", &Config::default());
    let variant = Variant::for_facet(facet, &project.layout).unwrap();
    let target = SUPPORTED_TARGETS[target_idx];

    let first = resolve(target, &variant, &tree, &project).unwrap();
    let second = resolve(target, &variant, &tree, &project).unwrap();
    prop_assert_eq!(&first, &second);
    prop_assert_eq!(serde_json::to_vec(&first).unwrap(), serde_json::to_vec(&second).unwrap());
  }

  #[test]
  fn distinct_pipelines_never_share_directories(
    a in 0..SUPPORTED_TARGETS.len(),
    b in 0..SUPPORTED_TARGETS.len(),
    facet_a in facet(),
    facet_b in facet(),
    build_type in build_type(),
  ) {
    let first = PipelineId::new(SUPPORTED_TARGETS[a], facet_a);
    let second = PipelineId::new(SUPPORTED_TARGETS[b], facet_b);
    prop_assume!(first != second);

    let build_dir = PathBuf::from("/p/build");
    let dirs_a: HashSet<_> = Partition::new(&build_dir, first, build_type).all_dirs().into_iter().collect();
    let dirs_b: HashSet<_> = Partition::new(&build_dir, second, build_type).all_dirs().into_iter().collect();
    prop_assert!(dirs_a.is_disjoint(&dirs_b));
  }
}
