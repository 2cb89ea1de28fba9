//! plugbuild-lib: cross-platform build orchestration for a host plugin
//!
//! This crate builds one native shared library per (target, variant):
//! - `target` / `variant`: the closed target set and the product facet
//! - `sources`: per-target composition of compile units and macros
//! - `compile` / `resources` / `link`: the stages of a pipeline
//! - `metadata`: version and date stamped into every artifact
//! - `unit_test`: the optional x64 unit-test executable
//! - `execute`: the stage graph and its parallel executor

pub mod compile;
pub mod config;
pub mod consts;
pub mod deps;
pub mod execute;
pub mod link;
pub mod macros;
pub mod metadata;
pub mod platform;
pub mod project;
pub mod resources;
pub mod runner;
pub mod session;
pub mod sources;
pub mod target;
pub mod toolchain;
pub mod util;
pub mod variant;
