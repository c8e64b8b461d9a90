//! External archive tools and how to find them.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::installer::error::{InstallError, InstallResult};

/// Exit code both tools use for a fatal error.
const FATAL_EXIT_CODE: i32 = 2;

/// Supported decompression tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// `tar` (GNU tar, bsdtar, or the Windows 10+ built-in).
    Tar,
    /// 7-Zip command-line (`7z`, `7za`, `7zz`).
    SevenZip,
}

impl ToolKind {
    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::SevenZip => "7-Zip",
        }
    }

    /// Binary names searched for, without platform suffix.
    fn binary_stems(&self) -> &'static [&'static str] {
        match self {
            Self::Tar => &["tar", "bsdtar"],
            Self::SevenZip => &["7z", "7za", "7zz"],
        }
    }

    fn binary_names(&self) -> impl Iterator<Item = String> {
        self.binary_stems()
            .iter()
            .map(|stem| format!("{}{}", stem, env::consts::EXE_SUFFIX))
    }

    /// Well-known install directories, checked before `PATH`.
    fn known_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if cfg!(windows) {
            if let Self::SevenZip = self {
                dirs.push(PathBuf::from(r"C:\Program Files\7-Zip"));
                dirs.push(PathBuf::from(r"C:\Program Files (x86)\7-Zip"));
            } else {
                dirs.push(PathBuf::from(r"C:\Windows\System32"));
            }
        } else {
            dirs.push(PathBuf::from("/usr/bin"));
            dirs.push(PathBuf::from("/usr/local/bin"));
            dirs.push(PathBuf::from("/opt/homebrew/bin"));
        }
        dirs
    }

    /// Guess the kind of an explicitly configured binary from its name.
    pub fn from_binary(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_ascii_lowercase();
        if stem.starts_with("7z") {
            Self::SevenZip
        } else {
            Self::Tar
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tar" => Ok(Self::Tar),
            "7z" | "7zip" | "7-zip" | "sevenzip" => Ok(Self::SevenZip),
            other => Err(format!("unknown extraction tool '{}' (expected tar or 7z)", other)),
        }
    }
}

/// A located decompression tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTool {
    pub kind: ToolKind,
    pub path: PathBuf,
}

impl ArchiveTool {
    pub fn new(kind: ToolKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Arguments for a full extraction, overwriting existing files without
    /// prompting.
    pub fn extract_args(&self, archive: &Path, destination: &Path) -> Vec<OsString> {
        match self.kind {
            ToolKind::Tar => vec![
                "-xf".into(),
                archive.into(),
                "-C".into(),
                destination.into(),
            ],
            ToolKind::SevenZip => vec![
                "x".into(),
                archive.into(),
                output_switch(destination),
                "-aoa".into(),
                "-y".into(),
                "-bso0".into(),
                "-bsp1".into(),
            ],
        }
    }

    /// Arguments to extract only the named entries.
    pub fn extract_entries_args(
        &self,
        archive: &Path,
        destination: &Path,
        entries: &[String],
    ) -> Vec<OsString> {
        let mut args = match self.kind {
            ToolKind::Tar => self.extract_args(archive, destination),
            ToolKind::SevenZip => vec![
                "x".into(),
                archive.into(),
                output_switch(destination),
                "-aoa".into(),
                "-y".into(),
                "-bso0".into(),
                "--".into(),
            ],
        };
        args.extend(entries.iter().map(OsString::from));
        args
    }

    /// Arguments to list the archive's entries.
    pub fn list_args(&self, archive: &Path) -> Vec<OsString> {
        match self.kind {
            ToolKind::Tar => vec!["-tf".into(), archive.into()],
            ToolKind::SevenZip => vec!["l".into(), "-ba".into(), "-slt".into(), archive.into()],
        }
    }

    /// File entries (directories excluded) from the output of `list_args`.
    ///
    /// Best effort: only used to pick entries for a salvage extraction.
    pub fn parse_listing(&self, output: &str) -> Vec<String> {
        match self.kind {
            ToolKind::Tar => output
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.is_empty() && !line.ends_with('/'))
                .map(str::to_string)
                .collect(),
            ToolKind::SevenZip => parse_technical_listing(output),
        }
    }

    /// Whether an exit code means the tool gave up entirely.
    pub fn is_fatal(&self, code: i32) -> bool {
        code == FATAL_EXIT_CODE
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

impl fmt::Display for ArchiveTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind.name(), self.path.display())
    }
}

fn output_switch(destination: &Path) -> OsString {
    let mut switch = OsString::from("-o");
    switch.push(destination.as_os_str());
    switch
}

/// Parse `7z l -slt` blocks of `Key = Value` lines.
fn parse_technical_listing(output: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut path: Option<&str> = None;
    let mut is_dir = false;

    let mut flush = |path: &mut Option<&str>, is_dir: &mut bool| {
        if let Some(p) = path.take() {
            if !*is_dir && !p.is_empty() {
                entries.push(p.to_string());
            }
        }
        *is_dir = false;
    };

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut path, &mut is_dir);
            continue;
        }
        let Some((key, value)) = line.split_once(" = ") else {
            continue;
        };
        match key {
            "Path" => {
                flush(&mut path, &mut is_dir);
                path = Some(value);
            }
            "Folder" => is_dir |= value == "+",
            "Attributes" => is_dir |= value.starts_with('D'),
            _ => {}
        }
    }
    flush(&mut path, &mut is_dir);
    entries
}

/// Finds decompression tools on this machine.
///
/// Looks in well-known install locations first, then in every directory of
/// the search path.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    search_path: Option<OsString>,
    known_locations: bool,
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolLocator {
    /// Locator using the process `PATH`.
    pub fn new() -> Self {
        Self {
            search_path: env::var_os("PATH"),
            known_locations: true,
        }
    }

    /// Locator using only the given search path (no known locations).
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
            known_locations: false,
        }
    }

    /// Find a binary for `kind`.
    pub fn locate(&self, kind: ToolKind) -> Option<PathBuf> {
        let mut dirs = Vec::new();
        if self.known_locations {
            dirs.extend(kind.known_dirs());
        }
        if let Some(search_path) = &self.search_path {
            dirs.extend(env::split_paths(search_path));
        }

        dirs.iter().find_map(|dir| {
            kind.binary_names()
                .map(|name| dir.join(name))
                .find(|candidate| candidate.is_file())
        })
    }

    /// Pick a tool: the explicit binary if given, else the first kind in
    /// `preference` that can be found.
    pub fn resolve(
        &self,
        preference: &[ToolKind],
        explicit: Option<&Path>,
    ) -> InstallResult<ArchiveTool> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(ArchiveTool::new(ToolKind::from_binary(path), path));
            }
            return Err(InstallError::ExtractionToolMissing {
                searched: path.display().to_string(),
            });
        }

        preference
            .iter()
            .find_map(|kind| self.locate(*kind).map(|path| ArchiveTool::new(*kind, path)))
            .ok_or_else(|| InstallError::ExtractionToolMissing {
                searched: preference
                    .iter()
                    .map(ToolKind::name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::error::ErrorKind;

    #[test]
    fn test_tool_kind_from_str() {
        assert_eq!("tar".parse::<ToolKind>().unwrap(), ToolKind::Tar);
        assert_eq!("7z".parse::<ToolKind>().unwrap(), ToolKind::SevenZip);
        assert_eq!("7-Zip".parse::<ToolKind>().unwrap(), ToolKind::SevenZip);
        assert!("unzip".parse::<ToolKind>().is_err());
    }

    #[test]
    fn test_tool_kind_from_binary() {
        assert_eq!(
            ToolKind::from_binary(Path::new("/opt/7zz")),
            ToolKind::SevenZip
        );
        assert_eq!(
            ToolKind::from_binary(Path::new("7z.exe")),
            ToolKind::SevenZip
        );
        assert_eq!(ToolKind::from_binary(Path::new("/usr/bin/tar")), ToolKind::Tar);
    }

    #[test]
    fn test_seven_zip_args() {
        let tool = ArchiveTool::new(ToolKind::SevenZip, "7z");
        let args = tool.extract_args(Path::new("/tmp/a.tar"), Path::new("/opt/atlas"));
        assert_eq!(
            args,
            vec!["x", "/tmp/a.tar", "-o/opt/atlas", "-aoa", "-y", "-bso0", "-bsp1"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_tar_entry_args() {
        let tool = ArchiveTool::new(ToolKind::Tar, "tar");
        let args = tool.extract_entries_args(
            Path::new("a.tar"),
            Path::new("out"),
            &["bin/app".to_string()],
        );
        assert_eq!(args[0], "-xf");
        assert_eq!(args[args.len() - 1], "bin/app");
    }

    #[test]
    fn test_parse_tar_listing() {
        let tool = ArchiveTool::new(ToolKind::Tar, "tar");
        let entries = tool.parse_listing("Atlas/\nAtlas/app\nAtlas/data/\nAtlas/data/a.bin\n");
        assert_eq!(entries, vec!["Atlas/app", "Atlas/data/a.bin"]);
    }

    #[test]
    fn test_parse_seven_zip_listing() {
        let output = "\
Path = Atlas
Folder = +
Size = 0

Path = Atlas/app.exe
Folder = -
Size = 1024
Attributes = A

Path = Atlas/data
Attributes = D
";
        let tool = ArchiveTool::new(ToolKind::SevenZip, "7z");
        assert_eq!(tool.parse_listing(output), vec!["Atlas/app.exe"]);
    }

    #[test]
    fn test_fatal_exit_code() {
        let tool = ArchiveTool::new(ToolKind::SevenZip, "7z");
        assert!(tool.is_fatal(2));
        assert!(!tool.is_fatal(1));
    }

    #[test]
    fn test_locate_in_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join(format!("tar{}", env::consts::EXE_SUFFIX));
        std::fs::write(&binary, b"").unwrap();

        let locator = ToolLocator::with_search_path(dir.path().as_os_str());
        assert_eq!(locator.locate(ToolKind::Tar), Some(binary.clone()));
        assert_eq!(locator.locate(ToolKind::SevenZip), None);

        let tool = locator
            .resolve(&[ToolKind::SevenZip, ToolKind::Tar], None)
            .unwrap();
        assert_eq!(tool.kind, ToolKind::Tar);
        assert_eq!(tool.path, binary);
    }

    #[test]
    fn test_resolve_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let locator = ToolLocator::with_search_path(dir.path().as_os_str());

        let err = locator
            .resolve(&[ToolKind::SevenZip, ToolKind::Tar], None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtractionToolMissing);
        assert!(err.to_string().contains("7-Zip, tar"));
    }

    #[test]
    fn test_resolve_missing_explicit_binary() {
        let err = ToolLocator::new()
            .resolve(&[ToolKind::Tar], Some(Path::new("/nonexistent/7z")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtractionToolMissing);
    }
}
