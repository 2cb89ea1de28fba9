//! Subprocess execution.
//!
//! Every compiler, archiver, linker and resource-compiler invocation goes
//! through a [`CommandRunner`]. [`ProcessRunner`] spawns real processes;
//! [`RecordingRunner`] records commands and materializes their declared
//! outputs without spawning anything.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::util::hash;

/// A fully rendered command line plus the files it is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandSpec {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: Option<PathBuf>,
  /// Files that must exist once the command succeeds.
  pub outputs: Vec<PathBuf>,
}

impl CommandSpec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      outputs: Vec::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
    self.outputs.push(path.into());
    self
  }

  pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  /// Whether the program or any argument contains `needle`.
  pub fn mentions(&self, needle: &str) -> bool {
    self.program.contains(needle) || self.args.iter().any(|a| a.contains(needle))
  }
}

impl fmt::Display for CommandSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.program)?;
    for arg in &self.args {
      if arg.contains(' ') {
        write!(f, " \"{arg}\"")?;
      } else {
        write!(f, " {arg}")?;
      }
    }
    Ok(())
  }
}

#[derive(Debug, Error)]
pub enum RunError {
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{program} exited with code {code:?}")]
  Failed {
    program: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("{program} succeeded but did not produce {path}")]
  MissingOutput { program: String, path: PathBuf },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub stdout: String,
  pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
  async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, RunError>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
  async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
    debug!(cmd = %spec, "spawning process");

    let mut command = Command::new(&spec.program);
    command.args(&spec.args);
    if let Some(cwd) = &spec.cwd {
      command.current_dir(cwd);
    }

    let output = command.output().await.map_err(|source| RunError::Spawn {
      program: spec.program.clone(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "command stderr");
      }
      return Err(RunError::Failed {
        program: spec.program.clone(),
        code: output.status.code(),
        stderr,
      });
    }

    for path in &spec.outputs {
      if !path.exists() {
        return Err(RunError::MissingOutput {
          program: spec.program.clone(),
          path: path.clone(),
        });
      }
    }

    Ok(CommandOutput { stdout, stderr })
  }
}

/// Records every command and writes its declared outputs.
///
/// Each output file receives the rendered command line and the hashes of any
/// input files named on it, so outputs change when their command or inputs do.
#[derive(Debug, Default)]
pub struct RecordingRunner {
  commands: Mutex<Vec<CommandSpec>>,
  failures: Mutex<Vec<String>>,
}

impl RecordingRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every command that mentions `needle` fail with exit code 1.
  pub fn fail_when(&self, needle: impl Into<String>) {
    self.failures.lock().unwrap_or_else(|e| e.into_inner()).push(needle.into());
  }

  /// Commands run so far, in completion order.
  pub fn commands(&self) -> Vec<CommandSpec> {
    self.commands.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Commands that mention `needle`.
  pub fn commands_mentioning(&self, needle: &str) -> Vec<CommandSpec> {
    self.commands().into_iter().filter(|c| c.mentions(needle)).collect()
  }

  pub fn clear(&self) {
    self.commands.lock().unwrap_or_else(|e| e.into_inner()).clear();
  }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
  async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
    self.commands.lock().unwrap_or_else(|e| e.into_inner()).push(spec.clone());

    let fails = self
      .failures
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .iter()
      .any(|needle| spec.mentions(needle));
    if fails {
      return Err(RunError::Failed {
        program: spec.program.clone(),
        code: Some(1),
        stderr: format!("forced failure: {spec}"),
      });
    }

    let mut content = format!("{spec}\n");
    for arg in &spec.args {
      let input = Path::new(arg);
      if input.is_file() && !spec.outputs.iter().any(|o| o == input) {
        content.push_str(&format!("{} {arg}\n", hash::hash_file(input)?));
      }
    }

    for path in &spec.outputs {
      if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
      }
      tokio::fs::write(path, &content).await?;
    }

    Ok(CommandOutput::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{echo, produce, shell};
  use tempfile::TempDir;

  #[test]
  fn display_quotes_arguments_with_spaces() {
    let spec = CommandSpec::new("cl").arg("/c").arg("C:/Program Files/x.cpp");
    assert_eq!(spec.to_string(), "cl /c \"C:/Program Files/x.cpp\"");
  }

  #[tokio::test]
  async fn process_runner_captures_stdout() {
    let output = ProcessRunner.run(&echo("hello")).await.unwrap();
    assert_eq!(output.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn process_runner_reports_exit_code() {
    let err = ProcessRunner.run(&shell("exit 3")).await.unwrap_err();
    assert!(matches!(err, RunError::Failed { code: Some(3), .. }));
  }

  #[tokio::test]
  async fn process_runner_checks_declared_outputs() {
    let temp = TempDir::new().unwrap();
    let spec = echo("nothing written").output(temp.path().join("missing.o"));
    let err = ProcessRunner.run(&spec).await.unwrap_err();
    assert!(matches!(err, RunError::MissingOutput { .. }));
  }

  #[tokio::test]
  async fn process_runner_accepts_produced_output() {
    let temp = TempDir::new().unwrap();
    let object = temp.path().join("unit.o");
    ProcessRunner.run(&produce(&object)).await.unwrap();
    assert!(object.exists());
  }

  #[tokio::test]
  async fn process_runner_reports_missing_program() {
    let err = ProcessRunner
      .run(&CommandSpec::new("definitely-not-a-real-compiler-xyz"))
      .await
      .unwrap_err();
    assert!(matches!(err, RunError::Spawn { .. }));
  }

  #[tokio::test]
  async fn recording_runner_materializes_outputs() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("deep/dir/a.o");
    let runner = RecordingRunner::new();
    runner
      .run(&CommandSpec::new("g++").arg("-c").arg("a.cpp").output(&out))
      .await
      .unwrap();

    assert_eq!(std::fs::read_to_string(&out).unwrap(), "g++ -c a.cpp\n");
    assert_eq!(runner.commands().len(), 1);
  }

  #[tokio::test]
  async fn recording_runner_forced_failure() {
    let runner = RecordingRunner::new();
    runner.fail_when("broken.cpp");
    let ok = runner.run(&CommandSpec::new("g++").arg("fine.cpp")).await;
    let err = runner.run(&CommandSpec::new("g++").arg("broken.cpp")).await;
    assert!(ok.is_ok());
    assert!(matches!(err, Err(RunError::Failed { code: Some(1), .. })));
    assert_eq!(runner.commands_mentioning("broken").len(), 1);
  }
}
