//! Target enumeration.
//!
//! The set of targets is closed: every supported OS appears at least once and
//! Windows is built for both x86 and x64. Configuration may only narrow it.

use tracing::debug;

use crate::config::ConfigError;
use crate::platform::{Arch, BuildTarget, Os};

/// Every target the orchestrator knows how to build, in build order.
pub const SUPPORTED_TARGETS: [BuildTarget; 4] = [
  BuildTarget::new(Os::Linux, Arch::X64),
  BuildTarget::new(Os::Windows, Arch::X64),
  BuildTarget::new(Os::Windows, Arch::X86),
  BuildTarget::new(Os::MacOs, Arch::X64),
];

/// Returns the targets to build.
///
/// An empty `filter` selects all supported targets. Each filter entry must
/// parse as a triple and name a supported target. Duplicates collapse. The
/// result keeps the order of [`SUPPORTED_TARGETS`].
pub fn enumerate_targets<S: AsRef<str>>(filter: &[S]) -> Result<Vec<BuildTarget>, ConfigError> {
  let targets: Vec<BuildTarget> = if filter.is_empty() {
    SUPPORTED_TARGETS.to_vec()
  } else {
    let mut wanted = Vec::with_capacity(filter.len());
    for entry in filter {
      let entry = entry.as_ref();
      let target: BuildTarget = entry
        .parse()
        .map_err(|_| ConfigError::UnknownTarget(entry.to_string()))?;
      if !SUPPORTED_TARGETS.contains(&target) {
        return Err(ConfigError::UnknownTarget(entry.to_string()));
      }
      wanted.push(target);
    }
    SUPPORTED_TARGETS.iter().copied().filter(|t| wanted.contains(t)).collect()
  };

  if targets.is_empty() {
    return Err(ConfigError::EmptyTargetSet);
  }

  debug!(count = targets.len(), "enumerated targets");
  Ok(targets)
}
