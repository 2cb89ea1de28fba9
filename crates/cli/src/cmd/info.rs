use std::sync::Arc;

use anyhow::{Context, Result};

use plugbuild_lib::platform::host_triple;
use plugbuild_lib::runner::ProcessRunner;
use plugbuild_lib::session::Session;

use crate::output::print_stat;

pub fn cmd_info(session: &Session) -> Result<()> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let metadata = rt.block_on(session.metadata(Arc::new(ProcessRunner)));

  println!("System:");
  match host_triple() {
    Some(triple) => print_stat("Platform", &triple),
    None => print_stat("Platform", "unsupported"),
  }
  print_stat("plugbuild", env!("CARGO_PKG_VERSION"));
  println!("Project:");
  print_stat("Root", &session.project.root.display().to_string());
  print_stat("Facet", session.variant.facet.as_str());
  print_stat("Build type", session.project.build_type.as_str());
  let version = if metadata.version.is_empty() {
    "<none>"
  } else {
    &metadata.version
  };
  print_stat("Version", version);
  print_stat("Build date", &metadata.date);
  Ok(())
}
