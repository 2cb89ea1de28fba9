use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating systems a plugin can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
  Windows,
  Linux,
  #[serde(rename = "macos")]
  MacOs,
}

impl Os {
  pub const ALL: [Os; 3] = [Os::Windows, Os::Linux, Os::MacOs];

  /// Detect the host operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Windows => "windows",
      Self::Linux => "linux",
      Self::MacOs => "macos",
    }
  }

  /// Linux and macOS consume the Win32 API through the windowing shim.
  pub fn is_unix(&self) -> bool {
    matches!(self, Self::Linux | Self::MacOs)
  }

  /// File extension of a shared library on this OS, without the dot.
  pub fn shared_library_ext(&self) -> &'static str {
    match self {
      Self::Windows => "dll",
      Self::Linux => "so",
      Self::MacOs => "dylib",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Os {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "windows" | "win" => Ok(Self::Windows),
      "linux" => Ok(Self::Linux),
      "macos" | "darwin" | "osx" => Ok(Self::MacOs),
      other => Err(format!("unknown operating system: {other}")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn current_returns_supported_os() {
    assert!(Os::current().is_some(), "Current OS should be supported");
  }

  #[test]
  fn parses_aliases() {
    assert_eq!("darwin".parse::<Os>().unwrap(), Os::MacOs);
    assert_eq!("Windows".parse::<Os>().unwrap(), Os::Windows);
    assert!("beos".parse::<Os>().is_err());
  }

  #[test]
  fn only_linux_and_macos_are_unix() {
    assert!(Os::Linux.is_unix());
    assert!(Os::MacOs.is_unix());
    assert!(!Os::Windows.is_unix());
  }
}
