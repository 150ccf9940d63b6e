//! Testing utilities for the simscan workspace
//!
//! Script fixtures, a counting host and a channel-backed watch recorder.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use simscan_host::{CodeHost, ExecUnit, HostResult, Module, Namespace, PythonHost, Value};
use tempfile::TempDir;

/// A simulation script declaring `name` through its parameter records
pub fn simulation_script(name: &str) -> String {
    format!(
        "varParam = [\n    ['name', 'display name', {name:?}],\n    ['energy', 'photon energy', 9000],\n]\n\n\
         def set_optics(v=None):\n    return ['aperture', 'lens']\n"
    )
}

/// A script that is not a simulation script
pub fn plain_script() -> String {
    "varParam = [['name', 'display name', 'Helper']]\n\ndef helper():\n    return 1\n".to_string()
}

/// Temporary script tree
pub struct ScriptTree {
    dir: TempDir,
}

impl ScriptTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Canonical root, as it appears in discovery keys
    pub fn canonical_root(&self) -> PathBuf {
        self.dir.path().canonicalize().expect("canonical root")
    }

    /// Write `body` to `rel`, creating parent directories
    pub fn write(&self, rel: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, body).expect("write script");
        path
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.dir.path().join(rel)).expect("remove script");
    }

    /// Discovery key of `rel`
    pub fn key(&self, rel: &str) -> String {
        self.canonical_root().join(rel).to_string_lossy().into_owned()
    }
}

impl Default for ScriptTree {
    fn default() -> Self {
        Self::new()
    }
}

/// [`PythonHost`] wrapper counting each operation
#[derive(Debug, Default)]
pub struct CountingHost {
    inner: PythonHost,
    parses: AtomicUsize,
    executions: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn parses(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CodeHost for CountingHost {
    fn parse(&self, source: &str) -> HostResult<Module> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        self.inner.parse(source)
    }

    fn unparse(&self, module: &Module) -> HostResult<String> {
        self.inner.unparse(module)
    }

    fn execute(&self, unit: &ExecUnit) -> HostResult<Namespace> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(unit)
    }

    fn call(&self, namespace: &Namespace, name: &str, args: Vec<Value>) -> HostResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.call(namespace, name, args)
    }
}

/// Collects values delivered to a callback
pub struct Recorder<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T: Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    /// Callback feeding this recorder
    pub fn callback(&self) -> impl Fn(T) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |value| {
            let _ = tx.send(value);
        }
    }

    /// Wait for the first delivered value satisfying `accept`
    pub fn wait_for(&self, timeout: Duration, accept: impl Fn(&T) -> bool) -> Option<T> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let left = deadline.checked_duration_since(std::time::Instant::now())?;
            match self.rx.recv_timeout(left) {
                Ok(value) if accept(&value) => return Some(value),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    }

    /// Values delivered so far
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

impl<T: Send + 'static> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_write_where_expected() {
        let tree = ScriptTree::new();
        let path = tree.write("nested/sim.py", &simulation_script("Beamline"));
        assert!(path.is_file());
        assert!(tree.key("nested/sim.py").ends_with("sim.py"));
        assert!(fs::read_to_string(path).unwrap().contains("\"Beamline\""));
    }

    #[test]
    fn recorder_waits_for_matching_value() {
        let recorder = Recorder::new();
        let cb = recorder.callback();
        cb(1);
        cb(2);
        assert_eq!(recorder.wait_for(Duration::from_millis(100), |v| *v == 2), Some(2));
        assert_eq!(recorder.wait_for(Duration::from_millis(20), |_| true), None);
    }
}
