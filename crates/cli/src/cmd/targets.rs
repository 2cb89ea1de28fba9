use anyhow::{Context, Result};
use serde::Serialize;

use plugbuild_lib::execute::plugin_root;
use plugbuild_lib::link::artifact_file_name;
use plugbuild_lib::session::Session;

use crate::output::{OutputFormat, print_json};

#[derive(Serialize)]
struct TargetJson {
  target: String,
  facet: String,
  artifact: String,
}

pub fn cmd_targets(session: &Session, format: OutputFormat) -> Result<()> {
  let mut rows = Vec::with_capacity(session.targets.len());
  for target in &session.targets {
    let root = plugin_root(&session.config, target.os)
      .with_context(|| format!("Failed to locate plugin directory for {target}"))?;
    let name = artifact_file_name(&session.project.product, session.variant.facet, target.os, target.arch);
    rows.push(TargetJson {
      target: target.triple(),
      facet: session.variant.facet.to_string(),
      artifact: root.join(name).display().to_string(),
    });
  }

  if format.is_json() {
    return print_json(&rows);
  }
  for row in &rows {
    println!("{:<12} {}", row.target, row.artifact);
  }
  Ok(())
}
