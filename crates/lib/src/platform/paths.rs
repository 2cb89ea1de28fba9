//! Per-user directory conventions of the host application.

use std::path::{Path, PathBuf};

use crate::consts::{HOST_APP_DIR, HOST_PLUGIN_SUBDIR};

use super::Os;

/// Returns the user's home directory, if the environment names one.
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory, if the environment names one.
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

/// Directory under `home` where the host application looks for plugins on `os`.
///
/// The convention is fixed per OS and independent of the machine running the
/// build, so artifacts for every target land at predictable paths.
pub fn plugin_dir(os: Os, home: &Path) -> PathBuf {
  let base = match os {
    Os::Windows => home.join("AppData").join("Roaming"),
    Os::Linux => home.join(".config"),
    Os::MacOs => home.join("Library").join("Application Support"),
  };
  base.join(HOST_APP_DIR).join(HOST_PLUGIN_SUBDIR)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plugin_dirs_are_distinct_per_os() {
    let home = Path::new("/home/user");
    assert_eq!(
      plugin_dir(Os::Windows, home),
      PathBuf::from("/home/user/AppData/Roaming/REAPER/UserPlugins")
    );
    assert_eq!(
      plugin_dir(Os::Linux, home),
      PathBuf::from("/home/user/.config/REAPER/UserPlugins")
    );
    assert_eq!(
      plugin_dir(Os::MacOs, home),
      PathBuf::from("/home/user/Library/Application Support/REAPER/UserPlugins")
    );
  }

  #[cfg(not(windows))]
  #[test]
  #[serial_test::serial]
  fn home_dir_reads_environment() {
    temp_env::with_var("HOME", Some("/home/tester"), || {
      assert_eq!(home_dir(), Some(PathBuf::from("/home/tester")));
    });
    temp_env::with_var("HOME", None::<&str>, || {
      assert_eq!(home_dir(), None);
    });
  }
}
