//! Recursive discovery of simulation scripts under a root

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::cache::{invert, DiscoveryCache, KeyBy, ScriptMap};
use crate::loader::{ScriptInfo, ScriptLoader};

/// Walks roots, loads candidates and memoizes the resulting mappings
#[derive(Debug, Clone)]
pub struct Discovery {
    loader: ScriptLoader,
    cache: Arc<DiscoveryCache>,
}

impl Discovery {
    /// Create discovery over a loader and a shared cache
    #[must_use]
    pub fn new(loader: ScriptLoader, cache: Arc<DiscoveryCache>) -> Self {
        Self { loader, cache }
    }

    /// Cache backing this discovery
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<DiscoveryCache> {
        &self.cache
    }

    /// Loader used for each candidate
    #[inline]
    #[must_use]
    pub fn loader(&self) -> &ScriptLoader {
        &self.loader
    }

    /// Mapping for `root` (current directory when `None`)
    ///
    /// A cache hit returns the stored mapping without touching the
    /// filesystem. Otherwise the root is rescanned and the result stored.
    pub fn discover(&self, root: Option<&Path>, use_cache: bool, key_by: KeyBy) -> Arc<ScriptMap> {
        if use_cache {
            if let Some(hit) = self.cache.get(root, key_by) {
                return hit;
            }
        }
        let scanned = self.scan(root);
        let map = match key_by {
            KeyBy::Path => scanned,
            KeyBy::Name => invert(&scanned),
        };
        self.cache.insert(root, key_by, map)
    }

    /// Uncached path-keyed scan of `root`
    #[must_use]
    pub fn scan(&self, root: Option<&Path>) -> ScriptMap {
        let dir = root.unwrap_or_else(|| Path::new("."));
        let mut map = ScriptMap::new();
        for path in self.candidates(dir) {
            let info = match self.loader.load(&path) {
                Ok(info) => info,
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "candidate vanished");
                    continue;
                }
            };
            if !info.is_simulation() {
                continue;
            }
            let name = display_name(&info, &self.loader.config().name_key);
            map.insert(info.path.to_string_lossy().into_owned(), name);
        }
        tracing::debug!(root = ?root, scripts = map.len(), "scan complete");
        map
    }

    /// Candidate files under `dir` in walk order
    ///
    /// Lexicographic by file name at each level; symlinks are not followed
    /// and unreadable entries are skipped.
    #[must_use]
    pub fn candidates(&self, dir: &Path) -> Vec<PathBuf> {
        if !dir.is_dir() {
            return Vec::new();
        }
        let config = self.loader.config();
        WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && config.matches_extension(entry.path()))
            .map(walkdir::DirEntry::into_path)
            .collect()
    }
}

/// Declared name, or the file stem when none is declared or it is empty
#[must_use]
pub fn display_name(info: &ScriptInfo, name_key: &str) -> String {
    info.declared_name(name_key)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            info.path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use simscan_host::PythonHost;
    use std::fs;

    fn discovery() -> Discovery {
        let loader = ScriptLoader::new(Arc::new(PythonHost::new()), Arc::new(EngineConfig::new()));
        Discovery::new(loader, Arc::new(DiscoveryCache::new()))
    }

    #[test]
    fn candidates_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        for rel in ["c.py", "a.py", "b/z.py", "b/notes.txt", "a.pyc"] {
            fs::write(dir.path().join(rel), "x = 1\n").unwrap();
        }
        let found: Vec<_> = discovery()
            .candidates(dir.path())
            .into_iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            found,
            vec![PathBuf::from("a.py"), PathBuf::from("b/z.py"), PathBuf::from("c.py")]
        );
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let d = discovery();
        let map = d.discover(Some(dir.path().join("absent").as_path()), true, KeyBy::Path);
        assert!(map.is_empty());
        let file = dir.path().join("file.py");
        fs::write(&file, "x = 1\n").unwrap();
        assert!(d.discover(Some(file.as_path()), false, KeyBy::Path).is_empty());
    }

    #[test]
    fn empty_declared_name_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("blank_name.py"),
            "varParam = [['name', 'd', '']]\ndef set_optics():\n    pass\n",
        )
        .unwrap();
        let map = discovery().scan(Some(dir.path()));
        assert_eq!(map.values().collect::<Vec<_>>(), vec!["blank_name"]);
    }
}
