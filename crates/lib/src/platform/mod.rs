pub mod arch;
pub mod os;
pub mod paths;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use arch::Arch;
pub use os::Os;

/// An (operating system, architecture) pair a pipeline is built for.
///
/// Targets are enumerated once at build start and never mutated; every
/// downstream decision branches on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildTarget {
  pub os: Os,
  pub arch: Arch,
}

impl BuildTarget {
  pub const fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// Detect the host platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      os: Os::current()?,
      arch: Arch::current()?,
    })
  }

  /// Returns the target triple string (e.g., "linux-x64")
  pub fn triple(&self) -> String {
    format!("{}-{}", self.os, self.arch)
  }
}

impl fmt::Display for BuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}

impl FromStr for BuildTarget {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (os, arch) = s
      .split_once('-')
      .ok_or_else(|| format!("expected <os>-<arch>, got: {s}"))?;
    Ok(Self::new(os.parse()?, arch.parse()?))
  }
}

/// Returns the triple for the host system (e.g., "linux-x64")
pub fn host_triple() -> Option<String> {
  BuildTarget::current().map(|t| t.triple())
}
