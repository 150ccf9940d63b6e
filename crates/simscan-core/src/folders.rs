//! Folder listing for simulation output directories

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::cache::ScriptMap;

/// Listing options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderOptions {
    /// Include folders whose name starts with `.`
    pub show_hidden: bool,
    /// Drop folders without simulation scripts beneath them
    pub scripts_only: bool,
}

impl Default for FolderOptions {
    fn default() -> Self {
        Self {
            show_hidden: false,
            scripts_only: true,
        }
    }
}

impl FolderOptions {
    /// With hidden folders included
    #[inline]
    #[must_use]
    pub fn with_hidden(mut self, show: bool) -> Self {
        self.show_hidden = show;
        self
    }

    /// With the scripts-only filter set
    #[inline]
    #[must_use]
    pub fn with_scripts_only(mut self, only: bool) -> Self {
        self.scripts_only = only;
        self
    }
}

/// One immediate sub-directory of a listed root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderInfo {
    /// Directory name
    pub name: String,
    /// Canonical path
    pub path: PathBuf,
    /// Total size of regular files beneath it, in bytes
    pub size: u64,
    /// Display names of simulation scripts beneath it, in walk order
    pub scripts: Vec<String>,
}

impl FolderInfo {
    /// `"<s1>, <s2> (+N more) - <name> (<MB> MB)"`, or `"<name> (<MB> MB)"`
    /// without scripts
    #[must_use]
    pub fn display(&self) -> String {
        #[allow(clippy::cast_precision_loss)]
        let size_mb = self.size as f64 / (1024.0 * 1024.0);
        if self.scripts.is_empty() {
            return format!("{} ({size_mb:.2} MB)", self.name);
        }
        let mut scripts = self.scripts.iter().take(2).cloned().collect::<Vec<_>>().join(", ");
        if self.scripts.len() > 2 {
            scripts.push_str(&format!(" (+{} more)", self.scripts.len() - 2));
        }
        format!("{scripts} - {} ({size_mb:.2} MB)", self.name)
    }
}

impl fmt::Display for FolderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// List the immediate sub-directories of `root`
///
/// `scripts` is the path-keyed discovery mapping of `root`; each folder
/// collects the names of the scripts located beneath it.
#[must_use]
pub fn list_folders(root: &Path, scripts: &ScriptMap, options: &FolderOptions) -> Vec<FolderInfo> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();

    let mut out = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !options.show_hidden && name.starts_with('.') {
            continue;
        }
        let path = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        let contained: Vec<String> = scripts
            .iter()
            .filter(|(script, _)| Path::new(script.as_str()).starts_with(&path))
            .map(|(_, name)| name.clone())
            .collect();
        if options.scripts_only && contained.is_empty() {
            continue;
        }
        out.push(FolderInfo {
            name,
            size: folder_size(&dir),
            path,
            scripts: contained,
        });
    }
    out
}

/// Total size of regular files beneath `dir`; unreadable entries count as zero
#[must_use]
pub fn folder_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}
