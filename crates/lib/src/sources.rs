//! Source set composition.
//!
//! [`resolve`] is the single place that branches on target OS and variant to
//! decide which units are compiled, with which macros, include paths and
//! system libraries. Every stage consults its [`Resolution`] rather than
//! testing the OS again.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ConfigError;
use crate::macros::{MacroError, MacroNamespace, MacroSet};
use crate::platform::{BuildTarget, Os};
use crate::project::Project;
use crate::variant::Variant;

/// Source language, which decides the compile stage a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Language {
  C,
  Cpp,
  ObjCpp,
}

impl Language {
  pub const ALL: [Language; 3] = [Language::Cpp, Language::C, Language::ObjCpp];

  pub fn from_path(path: &Path) -> Option<Self> {
    match path.extension()?.to_str()? {
      "c" => Some(Self::C),
      "cpp" | "cc" | "cxx" => Some(Self::Cpp),
      "mm" => Some(Self::ObjCpp),
      _ => None,
    }
  }

  /// Directory segment under `objs/` for this language's stage.
  pub fn stage_dir(&self) -> &'static str {
    match self {
      Self::C => "c",
      Self::Cpp => "cpp",
      Self::ObjCpp => "objcpp",
    }
  }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::C => "C",
      Self::Cpp => "C++",
      Self::ObjCpp => "Objective-C++",
    })
  }
}

/// Which product a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
  /// The authored plugin sources.
  Plugin,
  /// The foundation library (networking, PNG, rendering, windowing shim).
  Foundation,
  /// Unit tests linked into the test executable.
  Test,
}

/// One translation unit scheduled for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileUnit {
  pub language: Language,
  pub component: Component,
  pub source: PathBuf,
  pub macros: MacroSet,
}

/// Foundation library C++ sources shared by every target.
const FOUNDATION_CPP: &[&str] = &[
  // jnetlib
  "WDL/jnetlib/httpget.cpp",
  "WDL/jnetlib/util.cpp",
  "WDL/jnetlib/connection.cpp",
  "WDL/jnetlib/asyncdns.cpp",
  // libpng
  "WDL/libpng/png.cpp",
  "WDL/libpng/pngerror.cpp",
  "WDL/libpng/pngget.cpp",
  "WDL/libpng/pngmem.cpp",
  "WDL/libpng/pngpread.cpp",
  "WDL/libpng/pngread.cpp",
  "WDL/libpng/pngrio.cpp",
  "WDL/libpng/pngrtran.cpp",
  "WDL/libpng/pngrutil.cpp",
  "WDL/libpng/pngset.cpp",
  "WDL/libpng/pngtrans.cpp",
  // lice
  "WDL/lice/lice.cpp",
  // wingui
  "WDL/wingui/wndsize.cpp",
  "WDL/wingui/scrollbar/coolscroll.cpp",
];

const FOUNDATION_C: &[&str] = &[
  "WDL/zlib/adler32.c",
  "WDL/zlib/crc32.c",
  "WDL/zlib/inffast.c",
  "WDL/zlib/inflate.c",
  "WDL/zlib/inftrees.c",
  "WDL/zlib/zutil.c",
];

/// UTF-8 wrappers over the wide Win32 API; unneeded where swell stands in.
const WINDOWS_C: &[&str] = &["WDL/win32_utf8.c"];

const LINUX_SHIM_CPP: &[&str] = &["WDL/swell/swell-modstub-generic.cpp"];

/// swell core plus its ini-file backed settings store.
const MACOS_SHIM_CPP: &[&str] = &["WDL/swell/swell.cpp", "WDL/swell/swell-ini.cpp"];

const MACOS_SHIM_OBJCPP: &[&str] = &[
  "WDL/swell/swell-miscdlg.mm",
  "WDL/swell/swell-gdi.mm",
  "WDL/swell/swell-kb.mm",
  "WDL/swell/swell-menu.mm",
  "WDL/swell/swell-misc.mm",
  "WDL/swell/swell-dlg.mm",
  "WDL/swell/swell-wnd.mm",
];

const WINDOWS_SYSTEM_LIBS: &[&str] = &["user32", "gdi32", "advapi32", "shell32", "comdlg32"];

const MACOS_FRAMEWORKS: &[&str] = &["AppKit"];

/// Code generation switches shared verbatim by every stage of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenFlags {
  pub optimized: bool,
  pub debuggable: bool,
  pub position_independent: bool,
}

/// Libraries the final link needs from the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLibraries {
  pub libs: Vec<String>,
  pub frameworks: Vec<String>,
}

/// Authored plugin sources discovered on disk, sorted for determinism.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTree {
  pub plugin: Vec<PathBuf>,
  pub variant: Vec<PathBuf>,
}

impl SourceTree {
  /// Scan the plugin source root and the variant's extra source roots.
  ///
  /// The plugin root must exist. An absent extra root contributes nothing.
  pub fn discover(project: &Project, variant: &Variant) -> Result<Self, ConfigError> {
    let plugin = scan_sources(&project.path(&project.layout.plugin_sources))?;
    let mut extra = Vec::new();
    for dir in &variant.extra_sources {
      extra.extend(scan_optional(&project.path(dir))?);
    }
    Ok(Self { plugin, variant: extra })
  }
}

/// Unit-test sources under the configured test root; empty when it is absent.
pub fn scan_test_sources(project: &Project) -> Result<Vec<PathBuf>, ConfigError> {
  scan_optional(&project.path(&project.layout.test_sources))
}

fn scan_optional(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
  if !dir.exists() {
    debug!(dir = %dir.display(), "source root absent, skipping");
    return Ok(Vec::new());
  }
  scan_sources(dir)
}

fn scan_sources(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
  let mut found = Vec::new();
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|e| ConfigError::SourceScan {
      path: dir.to_path_buf(),
      message: e.to_string(),
    })?;
    if entry.file_type().is_file() && Language::from_path(entry.path()).is_some() {
      found.push(entry.into_path());
    }
  }
  Ok(found)
}

/// Everything a target's stages need to know about its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
  pub target: BuildTarget,
  pub units: Vec<CompileUnit>,
  pub include_dirs: Vec<PathBuf>,
  pub macros: MacroSet,
  pub flags: CodegenFlags,
  pub system: SystemLibraries,
}

impl Resolution {
  /// Units of one language, in composition order.
  pub fn units_for(&self, language: Language) -> impl Iterator<Item = &CompileUnit> {
    self.units.iter().filter(move |u| u.language == language)
  }

  pub fn has_units(&self, language: Language) -> bool {
    self.units_for(language).next().is_some()
  }

  /// Whether any foundation unit is compiled (false with a prebuilt archive).
  pub fn builds_foundation(&self) -> bool {
    self.units.iter().any(|u| u.component == Component::Foundation)
  }
}

/// Platform macros for `os`.
///
/// The shim is provided by the host application at runtime on Linux and
/// macOS, so only the thin module stub is compiled there.
pub fn platform_macros(os: Os) -> Result<MacroSet, MacroError> {
  let mut macros = MacroSet::new();
  if os.is_unix() {
    macros.define(MacroNamespace::Platform, "SWELL_TARGET_GDK", Some("3"))?;
    macros.define_flag(MacroNamespace::Platform, "NOMINMAX")?;
    macros.define_flag(MacroNamespace::Platform, "SWELL_PROVIDED_BY_APP")?;
  }
  Ok(macros)
}

fn system_libraries(os: Os) -> SystemLibraries {
  match os {
    Os::Windows => SystemLibraries {
      libs: WINDOWS_SYSTEM_LIBS.iter().map(|s| s.to_string()).collect(),
      frameworks: Vec::new(),
    },
    Os::MacOs => SystemLibraries {
      libs: Vec::new(),
      frameworks: MACOS_FRAMEWORKS.iter().map(|s| s.to_string()).collect(),
    },
    Os::Linux => SystemLibraries::default(),
  }
}

/// Compose the compile units and overlays for one (target, variant).
///
/// Pure: identical inputs always yield an identical [`Resolution`].
pub fn resolve(
  target: BuildTarget,
  variant: &Variant,
  tree: &SourceTree,
  project: &Project,
) -> Result<Resolution, MacroError> {
  let mut macros = platform_macros(target.os)?;
  macros.extend_from(&variant.macro_overlay)?;

  let mut units = Vec::new();
  let mut push = |component: Component, source: PathBuf| {
    if let Some(language) = Language::from_path(&source) {
      units.push(CompileUnit {
        language,
        component,
        source,
        macros: macros.clone(),
      });
    }
  };

  for source in tree.plugin.iter().chain(tree.variant.iter()) {
    push(Component::Plugin, source.clone());
  }

  if project.prebuilt_foundation.is_none() {
    let root = project.foundation_root();
    let (os_c, os_cpp, os_objcpp): (&[&str], &[&str], &[&str]) = match target.os {
      Os::Windows => (WINDOWS_C, &[], &[]),
      Os::Linux => (&[], LINUX_SHIM_CPP, &[]),
      Os::MacOs => (&[], MACOS_SHIM_CPP, MACOS_SHIM_OBJCPP),
    };
    let foundation = FOUNDATION_CPP
      .iter()
      .chain(os_cpp)
      .chain(os_c)
      .chain(FOUNDATION_C)
      .chain(os_objcpp);
    for rel in foundation {
      push(Component::Foundation, root.join(rel));
    }
  }

  let mut include_dirs = vec![project.path(&project.layout.plugin_headers)];
  include_dirs.extend(variant.extra_headers.iter().map(|h| project.path(h)));
  include_dirs.push(project.foundation_root());

  Ok(Resolution {
    target,
    units,
    include_dirs,
    macros,
    flags: CodegenFlags {
      optimized: project.build_type.is_optimized(),
      debuggable: project.build_type.is_debuggable(),
      position_independent: target.os.is_unix(),
    },
    system: system_libraries(target.os),
  })
}
