//! Pipeline integration tests.
//!
//! Full builds run against a temporary project tree with recording fakes in
//! place of the compiler, the resource translator and version control.

mod common;
mod incremental;
mod properties;
mod scenarios;
