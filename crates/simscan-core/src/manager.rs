//! `ScriptManager`: the public facade over loader, discovery and watches

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use simscan_host::{CodeHost, PythonHost, Value};

use crate::cache::{DiscoveryCache, KeyBy, ScriptMap};
use crate::config::{EngineConfig, WatchStrategy};
use crate::discovery::Discovery;
use crate::error::LoadError;
use crate::folders::{self, FolderInfo, FolderOptions};
use crate::loader::{EntryPoint, ScriptInfo, ScriptLoader};
use crate::watch::{WatchCallback, WatchSupervisor};

/// Discovery, loading and watching of simulation scripts
///
/// # Example
///
/// ```rust,ignore
/// use simscan_core::{KeyBy, ScriptManager};
///
/// let manager = ScriptManager::new();
/// let scripts = manager.discover(Some(Path::new("scripts")), true, KeyBy::Path);
/// for (path, name) in scripts.iter() {
///     println!("{name}: {path}");
/// }
/// ```
#[derive(Debug)]
pub struct ScriptManager {
    config: Arc<EngineConfig>,
    discovery: Discovery,
    watches: WatchSupervisor,
}

impl Default for ScriptManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptManager {
    /// Manager with default configuration and the embedded Python host
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Manager with `config` and the embedded Python host
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let host = PythonHost::with_limits(config.limits);
        Self::with_host(config, Arc::new(host))
    }

    /// Manager over an explicit host
    #[must_use]
    pub fn with_host(config: EngineConfig, host: Arc<dyn CodeHost>) -> Self {
        let config = Arc::new(config);
        let loader = ScriptLoader::new(host, Arc::clone(&config));
        let discovery = Discovery::new(loader, Arc::new(DiscoveryCache::new()));
        let watches = WatchSupervisor::new(discovery.clone(), Arc::clone(&config));
        Self {
            config,
            discovery,
            watches,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Discovery cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &DiscoveryCache {
        self.discovery.cache()
    }

    /// Simulation scripts under `root` (current directory when `None`)
    pub fn discover(&self, root: Option<&Path>, use_cache: bool, key_by: KeyBy) -> Arc<ScriptMap> {
        self.discovery.discover(root, use_cache, key_by)
    }

    /// Load one script
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ScriptInfo, LoadError> {
        self.discovery.loader().load(path)
    }

    /// Parameter records of one script
    pub fn get_parameters(&self, path: impl AsRef<Path>) -> Result<Option<Vec<Value>>, LoadError> {
        Ok(self.load(path)?.parameters)
    }

    /// Entry point of one script
    pub fn get_entry_point(&self, path: impl AsRef<Path>) -> Result<Option<EntryPoint>, LoadError> {
        Ok(self.load(path)?.optics_entry)
    }

    /// Drop cached mappings of `root`, or all of them when `None`
    pub fn clear_cache(&self, root: Option<&Path>) {
        self.discovery.cache().clear(root);
    }

    /// Watch `root` and call `callback` with each changed path-keyed mapping
    ///
    /// Replaces an existing watch on the same root. Returns the strategy
    /// actually in use.
    pub fn watch<F>(
        &self,
        root: Option<&Path>,
        callback: F,
        interval: Duration,
    ) -> std::io::Result<WatchStrategy>
    where
        F: Fn(Arc<ScriptMap>) + Send + Sync + 'static,
    {
        let callback: WatchCallback = Arc::new(callback);
        self.watches.watch(root, callback, interval)
    }

    /// Stop watching `root`; no-op when not watched
    pub fn unwatch(&self, root: Option<&Path>) {
        self.watches.unwatch(root);
    }

    /// Watched roots
    #[must_use]
    pub fn list_watches(&self) -> HashSet<Option<PathBuf>> {
        self.watches.list_watches()
    }

    /// Stop every watch
    pub fn unwatch_all(&self) {
        self.watches.unwatch_all();
    }

    /// Immediate sub-directories of `root` with their scripts and sizes
    #[must_use]
    pub fn list_folders(&self, root: &Path, options: &FolderOptions) -> Vec<FolderInfo> {
        if !root.is_dir() {
            return Vec::new();
        }
        let scripts = self.discover(Some(root), true, KeyBy::Path);
        folders::list_folders(root, &scripts, options)
    }
}
