//! Script loader: sanitize, stage and execute one script in isolation
//!
//! Loading a script never runs its side-effecting entry points: top-level
//! `main()`-style calls and `__main__` guards are stripped, the remaining
//! source is written to a fresh temp directory and executed there as a
//! uniquely named unit. The temp directory is removed when the load returns,
//! whatever the outcome.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use simscan_host::{CodeHost, ExecUnit, HostResult, Namespace, Value};
use tempfile::TempDir;

use crate::config::EngineConfig;
use crate::error::{LoadError, SkipReason};
use crate::sanitize::sanitize;

/// Callable handle into an executed script
///
/// Keeps the script's namespace alive and invokes the bound function through
/// the host that executed it.
#[derive(Clone)]
pub struct EntryPoint {
    host: Arc<dyn CodeHost>,
    namespace: Arc<Namespace>,
    name: String,
}

impl EntryPoint {
    /// Name of the bound function
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace the function lives in
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Invoke the function with positional arguments
    pub fn call(&self, args: Vec<Value>) -> HostResult<Value> {
        self.host.call(&self.namespace, &self.name, args)
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("name", &self.name)
            .field("unit", &self.namespace.name())
            .finish_non_exhaustive()
    }
}

/// Result of loading one script
#[derive(Debug, Clone)]
pub struct ScriptInfo {
    /// Canonical absolute path of the script
    pub path: PathBuf,
    /// The entry-point function, when the script binds one
    pub optics_entry: Option<EntryPoint>,
    /// Parameter records, when the parameter binding is a list or tuple
    pub parameters: Option<Vec<Value>>,
    /// Executed module namespace (absent when execution failed)
    pub namespace: Option<Arc<Namespace>>,
    /// Why the script is not a simulation script
    pub skip_reason: Option<SkipReason>,
}

impl ScriptInfo {
    fn skipped(path: PathBuf, reason: SkipReason) -> Self {
        Self {
            path,
            optics_entry: None,
            parameters: None,
            namespace: None,
            skip_reason: Some(reason),
        }
    }

    /// Whether the script defines the entry point
    #[inline]
    #[must_use]
    pub fn is_simulation(&self) -> bool {
        self.optics_entry.is_some()
    }

    /// Display name carried by the parameter records
    ///
    /// The first record that is a sequence of at least three items starting
    /// with `name_key` supplies `str(record[2])`.
    #[must_use]
    pub fn declared_name(&self, name_key: &str) -> Option<String> {
        self.parameters
            .as_deref()?
            .iter()
            .filter_map(Value::as_sequence)
            .find(|record| {
                record.len() >= 3 && record.first().and_then(Value::as_str) == Some(name_key)
            })
            .map(|record| record[2].py_str())
    }
}

/// Loads scripts through a [`CodeHost`]
#[derive(Clone)]
pub struct ScriptLoader {
    host: Arc<dyn CodeHost>,
    config: Arc<EngineConfig>,
}

impl fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScriptLoader {
    /// Create a loader
    #[must_use]
    pub fn new(host: Arc<dyn CodeHost>, config: Arc<EngineConfig>) -> Self {
        Self { host, config }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load one script
    ///
    /// Fails only when `path` does not exist; every other problem yields a
    /// [`ScriptInfo`] without entry point or parameters.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ScriptInfo, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        let resolved = resolve(path);

        let namespace = match self.execute(&resolved) {
            Ok(namespace) => Arc::new(namespace),
            Err(reason) => {
                if matches!(&reason, SkipReason::Execution(err) if err.is_limit()) {
                    tracing::warn!(path = %resolved.display(), %reason, "script stopped by execution limit");
                } else {
                    tracing::debug!(path = %resolved.display(), %reason, "script skipped");
                }
                return Ok(ScriptInfo::skipped(resolved, reason));
            }
        };

        let optics_entry = namespace
            .get(&self.config.entry_point)
            .filter(|v| v.is_callable())
            .map(|_| EntryPoint {
                host: Arc::clone(&self.host),
                namespace: Arc::clone(&namespace),
                name: self.config.entry_point.clone(),
            });
        let parameters = match namespace.get(&self.config.parameters_binding) {
            Some(Value::List(items) | Value::Tuple(items)) => Some(items.clone()),
            _ => None,
        };
        let skip_reason = if optics_entry.is_none() {
            let reason = SkipReason::NoEntryPoint(self.config.entry_point.clone());
            tracing::debug!(path = %resolved.display(), %reason, "script skipped");
            Some(reason)
        } else {
            None
        };

        Ok(ScriptInfo {
            path: resolved,
            optics_entry,
            parameters,
            namespace: Some(namespace),
            skip_reason,
        })
    }

    fn execute(&self, path: &Path) -> Result<Namespace, SkipReason> {
        let bytes = fs::read(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        let source = String::from_utf8(bytes).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        let module = self.host.parse(&source).map_err(SkipReason::Parse)?;

        let sanitized = sanitize(&module, self.config.stripped_calls.as_slice());
        let removed = module.body.len() - sanitized.body.len();
        if removed > 0 {
            tracing::trace!(path = %path.display(), removed, "stripped top-level statements");
        }
        let text = match self.host.unparse(&sanitized) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "cannot regenerate sanitized source, executing original"
                );
                source
            }
        };

        let staged = self.stage(&text)?;
        let mut search_path = Vec::with_capacity(1 + self.config.extra_search_paths.len());
        if let Some(dir) = path.parent() {
            search_path.push(dir.to_path_buf());
        }
        search_path.extend(self.config.extra_search_paths.iter().cloned());

        let unit = ExecUnit::new(staged.file(), search_path);
        let result = self.host.execute(&unit).map_err(SkipReason::Execution);
        staged.close();
        result
    }

    fn stage(&self, text: &str) -> Result<Staged, SkipReason> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.config.temp_prefix);
        let dir = match &self.config.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| SkipReason::Staging(e.to_string()))?;
        let file = dir
            .path()
            .join(format!("sanitized_{}.py", uuid::Uuid::new_v4().simple()));
        fs::write(&file, text).map_err(|e| SkipReason::Staging(e.to_string()))?;
        Ok(Staged { dir, file })
    }
}

/// Staged copy of a sanitized script
///
/// [`Staged::close`] removes the directory and reports failures; dropping
/// without closing (a panicking host) still removes it, silently.
struct Staged {
    dir: TempDir,
    file: PathBuf,
}

impl Staged {
    fn file(&self) -> &Path {
        &self.file
    }

    fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            tracing::warn!(dir = %path.display(), error = %err, "temp cleanup failed");
        }
    }
}

fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use simscan_host::{HostError, PythonHost};

    fn loader(temp_root: &Path) -> ScriptLoader {
        ScriptLoader::new(
            Arc::new(PythonHost::new()),
            Arc::new(EngineConfig::new().with_temp_root(temp_root)),
        )
    }

    #[test]
    fn declared_name_picks_first_complete_record() {
        let record = |items: &[&str]| Value::List(items.iter().map(|s| Value::from(*s)).collect());
        let info = ScriptInfo {
            path: PathBuf::from("/x/a.py"),
            optics_entry: None,
            parameters: Some(vec![
                record(&["name", "short"]),
                Value::Int(3),
                record(&["name", "d", "First"]),
                record(&["name", "d", "Second"]),
            ]),
            namespace: None,
            skip_reason: None,
        };
        assert_eq!(info.declared_name("name").as_deref(), Some("First"));
        assert_eq!(info.declared_name("title"), None);
    }

    #[test]
    fn entry_point_is_callable_through_host() {
        let scripts = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let path = scripts.path().join("sim.py");
        fs::write(
            &path,
            "varParam = (['name', 'd', 'Sim'],)\n\ndef set_optics(v=None):\n    return 'beamline'\n",
        )
        .unwrap();

        let info = loader(staging.path()).load(&path).unwrap();
        assert!(info.is_simulation());
        assert!(info.skip_reason.is_none());
        assert_eq!(info.declared_name("name").as_deref(), Some("Sim"));
        let entry = info.optics_entry.unwrap();
        assert_eq!(entry.name(), "set_optics");
        assert_eq!(entry.call(Vec::new()).unwrap(), Value::from("beamline"));
    }

    #[test]
    fn non_callable_entry_binding_is_not_an_entry_point() {
        let scripts = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let path = scripts.path().join("flag.py");
        fs::write(&path, "set_optics = 3\nvarParam = 'not a list'\n").unwrap();

        let info = loader(staging.path()).load(&path).unwrap();
        assert!(!info.is_simulation());
        assert!(info.parameters.is_none());
        assert!(info.namespace.is_some());
        assert!(matches!(info.skip_reason, Some(SkipReason::NoEntryPoint(_))));
    }

    #[test]
    fn failures_degrade_and_clean_up() {
        let scripts = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let broken = scripts.path().join("broken.py");
        fs::write(&broken, "def set_optics(:\n").unwrap();
        let raising = scripts.path().join("raising.py");
        fs::write(&raising, "def set_optics():\n    pass\nraise ValueError('boom')\n").unwrap();
        let binary = scripts.path().join("binary.py");
        fs::write(&binary, [0xff_u8, 0xfe, 0x00]).unwrap();

        let loader = loader(staging.path());
        let info = loader.load(&broken).unwrap();
        assert!(matches!(info.skip_reason, Some(SkipReason::Parse(HostError::Syntax { .. }))));
        let info = loader.load(&raising).unwrap();
        assert!(info.optics_entry.is_none());
        assert!(info.namespace.is_none());
        assert!(matches!(
            info.skip_reason,
            Some(SkipReason::Execution(HostError::Exception { ref kind, .. })) if kind == "ValueError"
        ));
        let info = loader.load(&binary).unwrap();
        assert!(matches!(info.skip_reason, Some(SkipReason::Unreadable(_))));

        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_path_is_the_only_error() {
        let staging = tempfile::tempdir().unwrap();
        let err = loader(staging.path())
            .load(staging.path().join("nope.py"))
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }
}
