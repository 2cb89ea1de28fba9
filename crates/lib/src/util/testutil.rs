//! Process fixtures for runner tests.
//!
//! Each helper returns a [`CommandSpec`] that behaves the same on every host.

use std::path::Path;

use crate::runner::CommandSpec;

/// Run `script` through the platform shell.
#[cfg(unix)]
pub fn shell(script: &str) -> CommandSpec {
  CommandSpec::new("/bin/sh").arg("-c").arg(script)
}

#[cfg(windows)]
pub fn shell(script: &str) -> CommandSpec {
  CommandSpec::new("cmd.exe").arg("/C").arg(script)
}

/// Print `msg` on stdout. `echo` is a builtin on Windows.
#[cfg(unix)]
pub fn echo(msg: &str) -> CommandSpec {
  CommandSpec::new("/bin/echo").arg(msg)
}

#[cfg(windows)]
pub fn echo(msg: &str) -> CommandSpec {
  shell(&format!("echo {msg}"))
}

/// A tool stand-in that writes `path` and declares it as its output.
pub fn produce(path: &Path) -> CommandSpec {
  let quoted = format!("\"{}\"", path.display());
  #[cfg(unix)]
  let script = format!("printf obj > {quoted}");
  #[cfg(windows)]
  let script = format!("echo obj> {quoted}");
  shell(&script).output(path)
}
