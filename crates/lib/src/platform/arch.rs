use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// CPU architectures a plugin can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
  X86,
  X64,
}

impl Arch {
  /// Detect the host CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X64),
      "x86" => Some(Self::X86),
      _ => None,
    }
  }

  /// Returns the identifier used in triples and artifact file names.
  ///
  /// `x86_64` is spelled `x64` so the file name is unambiguous next to `x86`.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86 => "x86",
      Self::X64 => "x64",
    }
  }

  pub fn pointer_width(&self) -> u32 {
    match self {
      Self::X86 => 32,
      Self::X64 => 64,
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Arch {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "x86" | "i386" | "i686" => Ok(Self::X86),
      "x64" | "x86_64" | "x86-64" | "amd64" => Ok(Self::X64),
      other => Err(format!("unknown architecture: {other}")),
    }
  }
}
