//! Discovery cache keyed by `(root, keying mode)`
//!
//! Roots are keyed exactly as given: `None` (current directory) and `"."`
//! are different entries.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Discovery result: path to name, or name to path
///
/// Iteration follows walk order; equality ignores order.
pub type ScriptMap = IndexMap<String, String>;

/// Which side of the mapping is the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyBy {
    /// Canonical path to display name
    #[default]
    Path,
    /// Display name to canonical path
    Name,
}

impl fmt::Display for KeyBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Name => "name",
        })
    }
}

impl FromStr for KeyBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(Self::Path),
            "name" => Ok(Self::Name),
            other => Err(format!("unknown key mode '{other}' (expected path or name)")),
        }
    }
}

/// Cache key
pub type CacheKey = (Option<PathBuf>, KeyBy);

fn key(root: Option<&Path>, key_by: KeyBy) -> CacheKey {
    (root.map(Path::to_path_buf), key_by)
}

/// Concurrent map of discovery results
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    entries: DashMap<CacheKey, Arc<ScriptMap>>,
}

impl DiscoveryCache {
    /// Create empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached mapping
    #[must_use]
    pub fn get(&self, root: Option<&Path>, key_by: KeyBy) -> Option<Arc<ScriptMap>> {
        self.entries
            .get(&key(root, key_by))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a mapping is cached
    #[inline]
    #[must_use]
    pub fn contains(&self, root: Option<&Path>, key_by: KeyBy) -> bool {
        self.entries.contains_key(&key(root, key_by))
    }

    /// Store a mapping, replacing any previous one
    pub fn insert(&self, root: Option<&Path>, key_by: KeyBy, map: ScriptMap) -> Arc<ScriptMap> {
        let map = Arc::new(map);
        self.entries.insert(key(root, key_by), Arc::clone(&map));
        map
    }

    /// Store `map` only if it differs from the cached one and `admit` agrees
    ///
    /// Comparison, the `admit` check and the write happen under one entry
    /// lock. Returns the stored mapping when it was written.
    pub fn replace_if_changed(
        &self,
        root: Option<&Path>,
        key_by: KeyBy,
        map: ScriptMap,
        admit: impl FnOnce() -> bool,
    ) -> Option<Arc<ScriptMap>> {
        match self.entries.entry(key(root, key_by)) {
            Entry::Occupied(mut entry) => {
                if **entry.get() == map || !admit() {
                    return None;
                }
                let map = Arc::new(map);
                entry.insert(Arc::clone(&map));
                Some(map)
            }
            Entry::Vacant(entry) => {
                if !admit() {
                    return None;
                }
                let map = Arc::new(map);
                entry.insert(Arc::clone(&map));
                Some(map)
            }
        }
    }

    /// Drop one mapping
    pub fn remove(&self, root: Option<&Path>, key_by: KeyBy) -> Option<Arc<ScriptMap>> {
        self.entries.remove(&key(root, key_by)).map(|(_, map)| map)
    }

    /// Drop both modes of `root`, or everything when `root` is `None`
    pub fn clear(&self, root: Option<&Path>) {
        match root {
            None => self.entries.clear(),
            Some(root) => {
                for key_by in [KeyBy::Path, KeyBy::Name] {
                    self.remove(Some(root), key_by);
                }
            }
        }
    }

    /// Number of cached mappings
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Swap keys and values; on duplicate names the first entry wins
#[must_use]
pub fn invert(map: &ScriptMap) -> ScriptMap {
    let mut inverted = ScriptMap::with_capacity(map.len());
    for (path, name) in map {
        inverted.entry(name.clone()).or_insert_with(|| path.clone());
    }
    inverted
}
