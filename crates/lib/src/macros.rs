//! Preprocessor macro sets.
//!
//! Macros live in three namespaces that must never define the same name:
//! platform-shim macros, variant macros and metadata macros. Metadata macros
//! are added last and are excluded from object fingerprints unless a unit
//! references them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacroNamespace {
  Platform,
  Variant,
  Metadata,
}

impl fmt::Display for MacroNamespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Platform => "platform",
      Self::Variant => "variant",
      Self::Metadata => "metadata",
    })
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacroError {
  #[error("macro {name} is already defined in the {existing} namespace (redefined in {attempted})")]
  Collision {
    name: String,
    existing: MacroNamespace,
    attempted: MacroNamespace,
  },
}

/// A single definition. `value: None` is a flag macro (`-DNAME`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
  pub value: Option<String>,
  pub namespace: MacroNamespace,
}

/// Ordered macro definitions keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroSet(BTreeMap<String, Macro>);

impl MacroSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Define `name` in `namespace`.
  ///
  /// Redefining a name within the same namespace replaces its value; defining
  /// it from another namespace is a collision.
  pub fn define(
    &mut self,
    namespace: MacroNamespace,
    name: impl Into<String>,
    value: Option<impl Into<String>>,
  ) -> Result<(), MacroError> {
    let name = name.into();
    if let Some(existing) = self.0.get(&name)
      && existing.namespace != namespace
    {
      return Err(MacroError::Collision {
        name,
        existing: existing.namespace,
        attempted: namespace,
      });
    }
    self.0.insert(
      name,
      Macro {
        value: value.map(Into::into),
        namespace,
      },
    );
    Ok(())
  }

  /// Define a flag macro with no value.
  pub fn define_flag(&mut self, namespace: MacroNamespace, name: impl Into<String>) -> Result<(), MacroError> {
    self.define(namespace, name, None::<String>)
  }

  /// Merge every definition of `other` into `self`, checking for collisions.
  pub fn extend_from(&mut self, other: &MacroSet) -> Result<(), MacroError> {
    for (name, def) in &other.0 {
      self.define(def.namespace, name.clone(), def.value.clone())?;
    }
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&Macro> {
    self.0.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.0.contains_key(name)
  }

  /// Value of `name`: `None` if undefined, `Some(None)` for a flag macro.
  pub fn value(&self, name: &str) -> Option<Option<&str>> {
    self.0.get(name).map(|m| m.value.as_deref())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Macro)> {
    self.0.iter().map(|(name, def)| (name.as_str(), def))
  }

  /// Definitions from `namespace` only.
  pub fn in_namespace(&self, namespace: MacroNamespace) -> impl Iterator<Item = (&str, &Macro)> {
    self.iter().filter(move |(_, def)| def.namespace == namespace)
  }

  /// A copy without any definition from `namespace`.
  pub fn without(&self, namespace: MacroNamespace) -> MacroSet {
    MacroSet(
      self
        .0
        .iter()
        .filter(|(_, def)| def.namespace != namespace)
        .map(|(name, def)| (name.clone(), def.clone()))
        .collect(),
    )
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Quote `value` as a C string literal, for macros such as `BUILD_DATE`.
pub fn c_string_literal(value: &str) -> String {
  let mut out = String::with_capacity(value.len() + 2);
  out.push('"');
  for ch in value.chars() {
    match ch {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      _ => out.push(ch),
    }
  }
  out.push('"');
  out
}
