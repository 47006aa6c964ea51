//! Tool-path configuration and the platform linker driver.
//!
//! The configuration file uses markdown-style sections:
//!
//! ```text
//! ## codegen
//! /usr/local/bin/veil-cgen
//!
//! ## linker
//! C:\Program Files\LLVM\bin
//!
//! ## libpaths
//! C:\Windows Kits\10\Lib\um\x64
//! ```
//!
//! Under the linker section, the first usable line names the directory of
//! the linker binary (joined with the platform linker executable); any
//! further lines there, and every line under the library section, are
//! library search paths. Empty lines, lines starting with `#` that are not
//! section headers, and lines whose first byte is non-ASCII are skipped;
//! surrounding quotes and doubled backslashes are cleaned up.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::BackendError;

#[cfg(windows)]
const LINKER_EXE: &str = "link.exe";
#[cfg(not(windows))]
const LINKER_EXE: &str = "cc";

/// Parsed tool locations.
#[derive(Debug, Default, Clone)]
pub struct ToolPaths {
    /// Full path to the linker binary.
    pub linker: Option<PathBuf>,
    /// Library search paths passed to the linker.
    pub lib_paths: Vec<PathBuf>,
    /// Optional external code generator binary.
    pub codegen: Option<PathBuf>,
}

impl ToolPaths {
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BackendError::Config(format!("could not open {}: {e}", path.display()))
        })?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        #[derive(PartialEq)]
        enum Section {
            None,
            Linker,
            LibPaths,
            Codegen,
            Other,
        }

        let mut paths = ToolPaths::default();
        let mut section = Section::None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix("##") {
                let header = header.trim().to_ascii_lowercase();
                section = if header.contains("linker") || header.contains("llc") {
                    Section::Linker
                } else if header.contains("lib") || header.contains("kits") {
                    Section::LibPaths
                } else if header.contains("codegen") {
                    Section::Codegen
                } else {
                    Section::Other
                };
                continue;
            }
            if section == Section::None || section == Section::Other {
                continue;
            }
            let Some(cleaned) = clean_path_line(line) else {
                continue;
            };

            match section {
                Section::Linker => {
                    if paths.linker.is_none() {
                        paths.linker = Some(PathBuf::from(&cleaned).join(LINKER_EXE));
                    } else {
                        paths.lib_paths.push(PathBuf::from(cleaned));
                    }
                }
                Section::LibPaths => paths.lib_paths.push(PathBuf::from(cleaned)),
                Section::Codegen => {
                    if paths.codegen.is_none() {
                        paths.codegen = Some(PathBuf::from(cleaned));
                    }
                }
                Section::None | Section::Other => {}
            }
        }

        paths
    }
}

/// Strip quotes and markdown backslash escaping; reject comments and
/// non-ASCII noise.
fn clean_path_line(line: &str) -> Option<String> {
    if line.starts_with('#') {
        return None;
    }
    if line.bytes().next().is_some_and(|b| b > 127) {
        return None;
    }

    let trimmed = line.trim_matches('"').trim();
    let mut cleaned = String::with_capacity(trimmed.len());
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'\\') {
            chars.next();
        }
        cleaned.push(c);
    }

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Assembles and runs the platform link command.
pub struct Linker {
    paths: ToolPaths,
}

impl Linker {
    pub fn new(paths: ToolPaths) -> Self {
        Self { paths }
    }

    pub fn from_config(path: &Path) -> Result<Self, BackendError> {
        Ok(Self::new(ToolPaths::load(path)?))
    }

    /// Link an object file into an executable.
    pub fn link(&self, obj: &Path, exe: &Path) -> Result<(), BackendError> {
        let linker = self.paths.linker.as_ref().ok_or_else(|| {
            BackendError::Config("no linker configured; check the tool-path file".into())
        })?;

        let mut command = Command::new(linker);
        self.platform_args(&mut command, obj, exe);
        tracing::debug!(linker = %linker.display(), "invoking linker");

        let status = command
            .status()
            .map_err(|e| BackendError::Tool(format!("{}: {e}", linker.display())))?;
        if !status.success() {
            return Err(BackendError::Tool(format!(
                "linker exited with {status}"
            )));
        }
        Ok(())
    }

    #[cfg(windows)]
    fn platform_args(&self, command: &mut Command, obj: &Path, exe: &Path) {
        command.arg(obj);
        command.arg(format!("/OUT:{}", exe.display()));
        for path in &self.paths.lib_paths {
            command.arg(format!("/LIBPATH:{}", path.display()));
        }
        command.args([
            "/SUBSYSTEM:CONSOLE",
            "/DEFAULTLIB:libcmt.lib",
            "/DEFAULTLIB:oldnames.lib",
            "/DEFAULTLIB:legacy_stdio_definitions.lib",
            "kernel32.lib",
        ]);
    }

    #[cfg(not(windows))]
    fn platform_args(&self, command: &mut Command, obj: &Path, exe: &Path) {
        command.arg(obj);
        command.arg("-o");
        command.arg(exe);
        for path in &self.paths.lib_paths {
            command.arg("-L");
            command.arg(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_skips_noise() {
        let text = "\
## linker
# this comment is skipped
\"/opt/llvm/bin\"
/opt/llvm/extra

## libpaths
/usr/lib/veil

## codegen
/usr/local/bin/veil-cgen
";
        let paths = ToolPaths::parse(text);
        let linker = paths.linker.expect("linker parsed");
        assert!(linker.starts_with("/opt/llvm/bin"));
        assert_eq!(
            paths.lib_paths,
            vec![PathBuf::from("/opt/llvm/extra"), PathBuf::from("/usr/lib/veil")]
        );
        assert_eq!(paths.codegen, Some(PathBuf::from("/usr/local/bin/veil-cgen")));
    }

    #[test]
    fn non_ascii_and_empty_lines_are_skipped() {
        let text = "## linker\n\n\u{00e9}not-a-path\n/real/dir\n";
        let paths = ToolPaths::parse(text);
        assert!(paths.linker.expect("linker parsed").starts_with("/real/dir"));
    }

    #[test]
    fn doubled_backslashes_collapse() {
        let text = "## linker\nC:\\\\Tools\\\\LLVM\n";
        let paths = ToolPaths::parse(text);
        let linker = paths.linker.expect("linker parsed");
        assert!(linker.to_string_lossy().starts_with("C:\\Tools\\LLVM"));
    }

    #[test]
    fn unknown_sections_are_ignored() {
        let text = "## notes\nremember to update this file\n## linker\n/bin\n";
        let paths = ToolPaths::parse(text);
        assert!(paths.linker.is_some());
        assert!(paths.lib_paths.is_empty());
    }
}
