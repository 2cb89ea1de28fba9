//! Header dependencies of a translation unit.
//!
//! A unit is only fresh while every file it pulls in is unchanged. The file
//! set is the union of:
//! - what the compiler reported on the previous build, read back from the
//!   Makefile-style depfile next to the object (`-MD -MF` writes it directly;
//!   `/showIncludes` output is converted into the same form)
//! - quoted `#include`s reachable from the source, resolved the way the
//!   compiler would search them
//!
//! The scan covers files the previous build could not have reported, such as
//! a header included for the first time or the relocated dialog and menu
//! descriptions.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::util::hash::{self, Fingerprint};

pub const DEPFILE_EXT: &str = "d";

const SHOW_INCLUDES_PREFIX: &str = "Note: including file:";

/// Depfile written next to `object`.
pub fn depfile_path(object: &Path) -> PathBuf {
  object.with_extension(DEPFILE_EXT)
}

/// Prerequisites of every rule in a Makefile-style depfile.
///
/// Handles line continuations, `\ ` escaped spaces and `$$`. A target's drive
/// letter colon is not a rule separator because it is not followed by
/// whitespace.
pub fn parse_depfile(text: &str) -> Vec<PathBuf> {
  let joined = text.replace("\\\r\n", " ").replace("\\\n", " ");
  let mut deps = Vec::new();
  for line in joined.lines() {
    let Some(split) = rule_separator(line) else {
      continue;
    };
    let mut current = String::new();
    let mut chars = line[split + 1..].chars().peekable();
    while let Some(c) = chars.next() {
      match c {
        '\\' if chars.peek() == Some(&' ') => {
          current.push(' ');
          chars.next();
        }
        '$' if chars.peek() == Some(&'$') => {
          current.push('$');
          chars.next();
        }
        c if c.is_whitespace() => {
          if !current.is_empty() {
            deps.push(PathBuf::from(std::mem::take(&mut current)));
          }
        }
        c => current.push(c),
      }
    }
    if !current.is_empty() {
      deps.push(PathBuf::from(current));
    }
  }
  deps
}

fn rule_separator(line: &str) -> Option<usize> {
  let bytes = line.as_bytes();
  (0..bytes.len()).find(|&i| bytes[i] == b':' && bytes.get(i + 1).is_none_or(|next| next.is_ascii_whitespace()))
}

/// Headers listed by `cl /showIncludes` on stdout.
pub fn parse_show_includes(stdout: &str) -> Vec<PathBuf> {
  stdout
    .lines()
    .filter_map(|line| line.strip_prefix(SHOW_INCLUDES_PREFIX))
    .map(str::trim)
    .filter(|path| !path.is_empty())
    .map(PathBuf::from)
    .collect()
}

fn escape(path: &Path) -> String {
  path.display().to_string().replace('$', "$$").replace(' ', "\\ ")
}

/// Record `deps` for `object` in depfile form.
pub fn write_depfile(object: &Path, deps: &[PathBuf]) -> io::Result<()> {
  let mut text = format!("{}:", escape(object));
  for dep in deps {
    text.push_str(" \\\n  ");
    text.push_str(&escape(dep));
  }
  text.push('\n');
  fs::write(depfile_path(object), text)
}

/// Quoted includes reachable from `source`.
///
/// Each name is looked up in the including file's directory, then in
/// `include_dirs` in order. Angle-bracket includes and names found nowhere are
/// left to the compiler's report.
pub fn scan_includes(source: &Path, include_dirs: &[PathBuf]) -> BTreeSet<PathBuf> {
  let mut found = BTreeSet::new();
  let mut pending = vec![source.to_path_buf()];
  while let Some(file) = pending.pop() {
    let Ok(bytes) = fs::read(&file) else {
      continue;
    };
    let text = String::from_utf8_lossy(&bytes);
    let local = file.parent().map(Path::to_path_buf);
    for name in quoted_includes(&text) {
      let resolved = local
        .iter()
        .chain(include_dirs)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file());
      if let Some(path) = resolved
        && path != source
        && found.insert(path.clone())
      {
        pending.push(path);
      }
    }
  }
  found
}

fn quoted_includes(text: &str) -> impl Iterator<Item = &str> {
  text.lines().filter_map(|line| {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("include")?.trim_start().strip_prefix('"')?;
    rest.split_once('"').map(|(name, _)| name)
  })
}

/// Current state of a unit's dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dependencies {
  /// Content hash per dependency; `None` once a dependency has disappeared.
  pub files: BTreeMap<PathBuf, Option<Fingerprint>>,
  /// Which of the watched names occur in the dependencies' text.
  #[serde(skip)]
  pub mentioned: BTreeSet<String>,
}

impl Dependencies {
  /// Hash every dependency of `source` and note which `watched` names they
  /// mention. The source itself is not included.
  pub fn gather(source: &Path, object: &Path, include_dirs: &[PathBuf], watched: &[String]) -> Self {
    let mut paths = scan_includes(source, include_dirs);
    if let Ok(text) = fs::read_to_string(depfile_path(object)) {
      paths.extend(parse_depfile(&text));
    }
    paths.remove(source);

    let mut deps = Self::default();
    for path in paths {
      let content = fs::read(&path).ok();
      if let Some(bytes) = &content {
        let text = String::from_utf8_lossy(bytes);
        for name in watched {
          if text.contains(name.as_str()) {
            deps.mentioned.insert(name.clone());
          }
        }
      }
      deps.files.insert(path, content.as_deref().map(hash::hash_bytes));
    }
    deps
  }
}
