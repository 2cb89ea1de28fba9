//! Product variant selection.
//!
//! A facet identifier picks one of two variants. Only the extended variant
//! contributes an overlay; unknown identifiers fall back to the base variant
//! with a warning instead of failing the build.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Layout;
use crate::consts::EXTENDED_MACRO;
use crate::macros::{MacroError, MacroNamespace, MacroSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
  #[default]
  Base,
  Extended,
}

impl Facet {
  /// Interpret an external facet identifier.
  ///
  /// Returns `None` for identifiers outside the known set.
  pub fn from_id(id: &str) -> Option<Self> {
    match id.trim().to_ascii_lowercase().as_str() {
      "base" | "ce" => Some(Self::Base),
      "extended" | "ultimate" => Some(Self::Extended),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Base => "base",
      Self::Extended => "extended",
    }
  }

  /// Short tag embedded in artifact file names.
  pub fn file_tag(&self) -> &'static str {
    match self {
      Self::Base => "ce",
      Self::Extended => "ultimate",
    }
  }
}

impl fmt::Display for Facet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A product variant and the overlay it adds to every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
  pub facet: Facet,
  /// Source directories compiled in addition to the base set, in order.
  pub extra_sources: Vec<PathBuf>,
  pub extra_headers: Vec<PathBuf>,
  pub macro_overlay: MacroSet,
}

impl Variant {
  /// The variant for `facet` with paths taken from `layout`.
  pub fn for_facet(facet: Facet, layout: &Layout) -> Result<Self, MacroError> {
    let mut variant = Self {
      facet,
      extra_sources: Vec::new(),
      extra_headers: Vec::new(),
      macro_overlay: MacroSet::new(),
    };

    if facet == Facet::Extended {
      variant.extra_sources.push(layout.extended_sources.clone());
      variant.extra_headers.push(layout.extended_headers.clone());
      variant.macro_overlay.define_flag(MacroNamespace::Variant, EXTENDED_MACRO)?;
    }

    Ok(variant)
  }

  pub fn name(&self) -> &'static str {
    self.facet.as_str()
  }
}

/// Resolve the facet for a build invocation.
///
/// Absent and unknown identifiers both resolve to [`Facet::Base`].
pub fn select_facet(id: Option<&str>) -> Facet {
  match id {
    None => Facet::Base,
    Some(id) => Facet::from_id(id).unwrap_or_else(|| {
      warn!(facet = %id, "unknown facet, falling back to base variant");
      Facet::Base
    }),
  }
}

/// Resolve the variant for a build invocation.
pub fn select_variant(id: Option<&str>, layout: &Layout) -> Result<Variant, MacroError> {
  Variant::for_facet(select_facet(id), layout)
}
