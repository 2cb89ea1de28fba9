//! Toolchain selection and command-line rendering.
//!
//! The toolchain is chosen from the target OS and rendered once into the
//! primary stage configuration; derived stages reuse it verbatim.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ProgramOverrides;
use crate::deps;
use crate::macros::MacroSet;
use crate::platform::{Arch, BuildTarget, Os};
use crate::runner::CommandSpec;
use crate::sources::{CodegenFlags, Component, Language, SystemLibraries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Toolchain {
  Gcc,
  Clang,
  VisualCpp,
}

impl Toolchain {
  pub fn for_os(os: Os) -> Self {
    match os {
      Os::Windows => Self::VisualCpp,
      Os::Linux => Self::Gcc,
      Os::MacOs => Self::Clang,
    }
  }

  pub fn object_ext(&self) -> &'static str {
    match self {
      Self::VisualCpp => "obj",
      Self::Gcc | Self::Clang => "o",
    }
  }

  /// File name of a static archive with the given stem.
  pub fn static_lib_name(&self, stem: &str) -> String {
    match self {
      Self::VisualCpp => format!("{stem}.lib"),
      Self::Gcc | Self::Clang => format!("lib{stem}.a"),
    }
  }

  pub fn is_msvc(&self) -> bool {
    matches!(self, Self::VisualCpp)
  }

  fn define(&self, name: &str, value: Option<&str>) -> String {
    let prefix = if self.is_msvc() { "/D" } else { "-D" };
    match value {
      Some(value) => format!("{prefix}{name}={value}"),
      None => format!("{prefix}{name}"),
    }
  }

  fn include(&self, dir: &Path) -> String {
    let prefix = if self.is_msvc() { "/I" } else { "-I" };
    format!("{prefix}{}", dir.display())
  }

  fn standard(&self, language: Language, component: Component) -> Vec<&'static str> {
    match (self.is_msvc(), language, component) {
      (_, Language::C, _) => vec![],
      (false, _, Component::Plugin | Component::Test) => vec!["-std=c++17", "-fpermissive"],
      (false, _, Component::Foundation) => vec!["-std=c++14"],
      (true, _, Component::Plugin | Component::Test) => vec!["/std:c++17", "/permissive-", "/EHsc"],
      (true, _, Component::Foundation) => vec!["/std:c++14", "/EHsc"],
    }
  }
}

impl fmt::Display for Toolchain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Gcc => "gcc",
      Self::Clang => "clang",
      Self::VisualCpp => "msvc",
    })
  }
}

/// Concrete program names for every tool a pipeline invokes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Programs {
  pub cc: String,
  pub cxx: String,
  pub objcxx: String,
  pub ar: String,
  pub rc: String,
  pub linker: String,
}

impl Programs {
  pub fn defaults(toolchain: Toolchain) -> Self {
    let (cc, cxx, ar, rc, linker) = match toolchain {
      Toolchain::Gcc => ("gcc", "g++", "ar", "windres", "g++"),
      Toolchain::Clang => ("clang", "clang++", "ar", "rc", "clang++"),
      Toolchain::VisualCpp => ("cl", "cl", "lib", "rc", "link"),
    };
    Self {
      cc: cc.to_string(),
      cxx: cxx.to_string(),
      objcxx: cxx.to_string(),
      ar: ar.to_string(),
      rc: rc.to_string(),
      linker: linker.to_string(),
    }
  }

  pub fn with_overrides(toolchain: Toolchain, overrides: &ProgramOverrides) -> Self {
    let defaults = Self::defaults(toolchain);
    let pick = |o: &Option<String>, d: String| o.clone().unwrap_or(d);
    Self {
      cc: pick(&overrides.cc, defaults.cc),
      cxx: pick(&overrides.cxx, defaults.cxx),
      objcxx: pick(&overrides.objcxx, defaults.objcxx),
      ar: pick(&overrides.ar, defaults.ar),
      rc: pick(&overrides.rc, defaults.rc),
      linker: pick(&overrides.linker, defaults.linker),
    }
  }

  pub fn compiler(&self, language: Language) -> &str {
    match language {
      Language::C => &self.cc,
      Language::Cpp => &self.cxx,
      Language::ObjCpp => &self.objcxx,
    }
  }
}

/// A toolchain bound to a target and its programs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Toolset {
  pub toolchain: Toolchain,
  pub target: BuildTarget,
  pub programs: Programs,
}

/// Inputs of a single compile command, borrowed from the stage configuration.
pub struct CompileInvocation<'a> {
  pub language: Language,
  pub component: Component,
  pub source: &'a Path,
  pub object: &'a Path,
  pub include_dirs: &'a [PathBuf],
  pub macros: &'a MacroSet,
  pub flags: CodegenFlags,
}

impl Toolset {
  pub fn new(target: BuildTarget, overrides: &ProgramOverrides) -> Self {
    let toolchain = Toolchain::for_os(target.os);
    Self {
      toolchain,
      target,
      programs: Programs::with_overrides(toolchain, overrides),
    }
  }

  fn arch_flag(&self) -> Option<&'static str> {
    match (self.toolchain, self.target.arch) {
      (Toolchain::VisualCpp, _) => None,
      (_, Arch::X86) => Some("-m32"),
      (_, Arch::X64) => Some("-m64"),
    }
  }

  fn machine(&self) -> &'static str {
    match self.target.arch {
      Arch::X86 => "/MACHINE:X86",
      Arch::X64 => "/MACHINE:X64",
    }
  }

  pub fn compile_command(&self, inv: &CompileInvocation<'_>) -> CommandSpec {
    let tc = self.toolchain;
    let source = inv.source.display().to_string();
    let object = inv.object.display().to_string();

    let mut cmd = CommandSpec::new(self.programs.compiler(inv.language));
    // Header dependencies: cl lists them on stdout, the others write a depfile.
    cmd = if tc.is_msvc() {
      cmd
        .args(["/nologo", "/c"])
        .arg(source)
        .arg(format!("/Fo{object}"))
        .arg("/showIncludes")
    } else {
      cmd
        .arg("-c")
        .arg(source)
        .arg("-o")
        .arg(object)
        .args(["-MD", "-MF"])
        .arg(deps::depfile_path(inv.object).display().to_string())
    };

    cmd = cmd.args(tc.standard(inv.language, inv.component));

    if inv.flags.optimized {
      cmd = cmd.arg(if tc.is_msvc() { "/O2" } else { "-O2" });
    }
    if inv.flags.debuggable {
      cmd = cmd.arg(if tc.is_msvc() { "/Zi" } else { "-g" });
    }
    if inv.flags.position_independent && !tc.is_msvc() {
      cmd = cmd.arg("-fPIC");
    }
    if let Some(flag) = self.arch_flag() {
      cmd = cmd.arg(flag);
    }

    cmd = cmd.args(inv.include_dirs.iter().map(|d| tc.include(d)));
    cmd = cmd.args(inv.macros.iter().map(|(name, def)| tc.define(name, def.value.as_deref())));

    cmd.output(inv.object)
  }

  pub fn archive_command(&self, output: &Path, objects: &[PathBuf]) -> CommandSpec {
    let cmd = CommandSpec::new(&self.programs.ar);
    let cmd = if self.toolchain.is_msvc() {
      cmd.arg("/nologo").arg(format!("/OUT:{}", output.display()))
    } else {
      cmd.arg("rcs").arg(output.display().to_string())
    };
    cmd.args(objects.iter().map(|o| o.display().to_string())).output(output)
  }

  /// Link objects, archives and compiled resources into a shared library.
  pub fn link_command(
    &self,
    output: &Path,
    objects: &[PathBuf],
    archives: &[PathBuf],
    resources: &[PathBuf],
    system: &SystemLibraries,
  ) -> CommandSpec {
    self.link(true, output, objects, archives, resources, system)
  }

  /// Link a standalone executable, such as the unit-test binary.
  pub fn executable_command(
    &self,
    output: &Path,
    objects: &[PathBuf],
    archives: &[PathBuf],
    system: &SystemLibraries,
  ) -> CommandSpec {
    self.link(false, output, objects, archives, &[], system)
  }

  fn link(
    &self,
    shared: bool,
    output: &Path,
    objects: &[PathBuf],
    archives: &[PathBuf],
    resources: &[PathBuf],
    system: &SystemLibraries,
  ) -> CommandSpec {
    let inputs = objects
      .iter()
      .chain(resources)
      .chain(archives)
      .map(|p| p.display().to_string());

    let mut cmd = CommandSpec::new(&self.programs.linker);
    if self.toolchain.is_msvc() {
      cmd = cmd.arg("/nologo");
      if shared {
        cmd = cmd.arg("/DLL");
      }
      cmd = cmd
        .arg(format!("/OUT:{}", output.display()))
        .arg(self.machine())
        .args(inputs)
        .args(system.libs.iter().map(|l| format!("{l}.lib")));
    } else {
      if shared {
        cmd = cmd.arg(if self.toolchain == Toolchain::Clang {
          "-dynamiclib"
        } else {
          "-shared"
        });
      }
      cmd = cmd.arg("-o").arg(output.display().to_string()).args(inputs);
      if let Some(flag) = self.arch_flag() {
        cmd = cmd.arg(flag);
      }
      cmd = cmd.args(system.libs.iter().map(|l| format!("-l{l}")));
      for framework in &system.frameworks {
        cmd = cmd.arg("-framework").arg(framework.clone());
      }
    }
    cmd.output(output)
  }

  /// Compile the canonical resource script into a binary resource object.
  pub fn resource_command(&self, script: &Path, output: &Path, include_dirs: &[PathBuf]) -> CommandSpec {
    CommandSpec::new(&self.programs.rc)
      .arg("/v")
      .args(include_dirs.iter().map(|d| format!("/I{}", d.display())))
      .arg("/fo")
      .arg(output.display().to_string())
      .arg(script.display().to_string())
      .output(output)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::macros::MacroNamespace;

  fn flags(pic: bool) -> CodegenFlags {
    CodegenFlags {
      optimized: true,
      debuggable: false,
      position_independent: pic,
    }
  }

  fn macros() -> MacroSet {
    let mut m = MacroSet::new();
    m.define(MacroNamespace::Platform, "SWELL_TARGET_GDK", Some("3")).unwrap();
    m.define_flag(MacroNamespace::Platform, "NOMINMAX").unwrap();
    m
  }

  #[test]
  fn gcc_compile_command() {
    let toolset = Toolset::new(BuildTarget::new(Os::Linux, Arch::X64), &ProgramOverrides::default());
    let includes = vec![PathBuf::from("/p/headers")];
    let macros = macros();
    let cmd = toolset.compile_command(&CompileInvocation {
      language: Language::Cpp,
      component: Component::Plugin,
      source: Path::new("/p/a.cpp"),
      object: Path::new("/b/a.o"),
      include_dirs: &includes,
      macros: &macros,
      flags: flags(true),
    });

    assert_eq!(cmd.program, "g++");
    assert_eq!(
      cmd.args,
      vec![
        "-c",
        "/p/a.cpp",
        "-o",
        "/b/a.o",
        "-MD",
        "-MF",
        "/b/a.d",
        "-std=c++17",
        "-fpermissive",
        "-O2",
        "-fPIC",
        "-m64",
        "-I/p/headers",
        "-DNOMINMAX",
        "-DSWELL_TARGET_GDK=3",
      ]
    );
    assert_eq!(cmd.outputs, vec![PathBuf::from("/b/a.o")]);
  }

  #[test]
  fn msvc_compile_command_for_c() {
    let toolset = Toolset::new(BuildTarget::new(Os::Windows, Arch::X86), &ProgramOverrides::default());
    let cmd = toolset.compile_command(&CompileInvocation {
      language: Language::C,
      component: Component::Foundation,
      source: Path::new("zutil.c"),
      object: Path::new("zutil.obj"),
      include_dirs: &[],
      macros: &MacroSet::new(),
      flags: flags(false),
    });
    assert_eq!(cmd.program, "cl");
    assert_eq!(cmd.args, vec!["/nologo", "/c", "zutil.c", "/Fozutil.obj", "/showIncludes", "/O2"]);
  }

  #[test]
  fn overrides_replace_defaults() {
    let overrides = ProgramOverrides {
      cxx: Some("clang++-18".to_string()),
      ..ProgramOverrides::default()
    };
    let programs = Programs::with_overrides(Toolchain::Gcc, &overrides);
    assert_eq!(programs.cxx, "clang++-18");
    assert_eq!(programs.cc, "gcc");
  }

  #[test]
  fn macos_link_uses_appkit() {
    let toolset = Toolset::new(BuildTarget::new(Os::MacOs, Arch::X64), &ProgramOverrides::default());
    let system = SystemLibraries {
      libs: vec![],
      frameworks: vec!["AppKit".to_string()],
    };
    let cmd = toolset.link_command(
      Path::new("out.dylib"),
      &[PathBuf::from("a.o")],
      &[PathBuf::from("libfoundation.a")],
      &[],
      &system,
    );
    assert_eq!(
      cmd.args,
      vec![
        "-dynamiclib",
        "-o",
        "out.dylib",
        "a.o",
        "libfoundation.a",
        "-m64",
        "-framework",
        "AppKit"
      ]
    );
  }

  #[test]
  fn msvc_link_lists_system_libraries() {
    let toolset = Toolset::new(BuildTarget::new(Os::Windows, Arch::X64), &ProgramOverrides::default());
    let system = SystemLibraries {
      libs: vec!["user32".to_string(), "gdi32".to_string()],
      frameworks: vec![],
    };
    let cmd = toolset.link_command(
      Path::new("p.dll"),
      &[PathBuf::from("a.obj")],
      &[],
      &[PathBuf::from("resource.res")],
      &system,
    );
    assert_eq!(cmd.program, "link");
    assert_eq!(
      cmd.args,
      vec![
        "/nologo",
        "/DLL",
        "/OUT:p.dll",
        "/MACHINE:X64",
        "a.obj",
        "resource.res",
        "user32.lib",
        "gdi32.lib"
      ]
    );
  }

  #[test]
  fn executable_link_drops_shared_flags() {
    let system = SystemLibraries {
      libs: vec!["pthread".to_string()],
      frameworks: vec![],
    };
    let gcc = Toolset::new(BuildTarget::new(Os::Linux, Arch::X64), &ProgramOverrides::default());
    let cmd = gcc.executable_command(
      Path::new("unit_tests"),
      &[PathBuf::from("t.o")],
      &[PathBuf::from("libgtest.a")],
      &system,
    );
    assert_eq!(cmd.args, vec!["-o", "unit_tests", "t.o", "libgtest.a", "-m64", "-lpthread"]);

    let msvc = Toolset::new(BuildTarget::new(Os::Windows, Arch::X64), &ProgramOverrides::default());
    let cmd = msvc.executable_command(Path::new("unit_tests.exe"), &[PathBuf::from("t.obj")], &[], &SystemLibraries::default());
    assert_eq!(cmd.args, vec!["/nologo", "/OUT:unit_tests.exe", "/MACHINE:X64", "t.obj"]);
  }

  #[test]
  fn archive_names() {
    assert_eq!(Toolchain::Gcc.static_lib_name("foundation"), "libfoundation.a");
    assert_eq!(Toolchain::VisualCpp.static_lib_name("foundation"), "foundation.lib");
  }
}
