//! Watch supervisor: keeps cached discovery results live
//!
//! One worker thread per watched root. `watch` caches a baseline for an
//! uncached root before it returns. The worker then blocks on a
//! [`WatchBackend`] (filesystem events, or a polling timer), rescans the root
//! when woken, and reports the new mapping to the callback only when it
//! differs from the cached one.
//!
//! ```text
//! WatchSupervisor
//!   registry: root -> WatchHandle { stop, active, thread }
//!         |
//!     worker thread
//!         |  backend.wait(stop)
//!         v
//!   Discovery::scan -> DiscoveryCache::replace_if_changed -> callback
//! ```

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::cache::{KeyBy, ScriptMap};
use crate::config::{EngineConfig, WatchStrategy};
use crate::discovery::Discovery;

/// Callback receiving each changed path-keyed mapping
pub type WatchCallback = Arc<dyn Fn(Arc<ScriptMap>) + Send + Sync>;

/// Interpreter recursion runs on the worker's stack
const WORKER_STACK: usize = 8 * 1024 * 1024;

/// Why a backend returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The root may have changed
    Changed,
    /// Stop was requested or the backend is gone
    Stop,
}

/// Source of change notifications for one root
pub trait WatchBackend: Send {
    /// Strategy this backend implements
    fn strategy(&self) -> WatchStrategy;

    /// Block until the root may have changed or `stop` fires
    ///
    /// `stop` fires when its sender sends or is dropped.
    fn wait(&mut self, stop: &Receiver<()>) -> Wake;
}

/// Wakes once per interval
#[derive(Debug, Clone, Copy)]
pub struct PollingWatcher {
    interval: Duration,
}

impl PollingWatcher {
    /// Create a polling backend
    #[inline]
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl WatchBackend for PollingWatcher {
    fn strategy(&self) -> WatchStrategy {
        WatchStrategy::Poll
    }

    fn wait(&mut self, stop: &Receiver<()>) -> Wake {
        match stop.recv_timeout(self.interval) {
            Err(RecvTimeoutError::Timeout) => Wake::Changed,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Wake::Stop,
        }
    }
}

/// Wakes on filesystem events for matching files
pub struct EventWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for EventWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWatcher")
            .field("queued", &self.events.len())
            .finish_non_exhaustive()
    }
}

impl EventWatcher {
    /// Start observing `dir` recursively
    pub fn start(dir: &Path, config: Arc<EngineConfig>) -> notify::Result<Self> {
        let (tx, events) = channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let _ = tx.send(event);
        })?;
        watcher.watch(dir, RecursiveMode::Recursive)?;
        Ok(Self {
            _watcher: watcher,
            events,
            config,
        })
    }

    fn is_relevant(&self, event: &Event) -> bool {
        let kind = matches!(
            event.kind,
            EventKind::Any | EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_)
        ) && !matches!(event.kind, EventKind::Modify(ModifyKind::Metadata(_)));
        kind && event.paths.iter().any(|p| self.config.matches_extension(p))
    }
}

impl WatchBackend for EventWatcher {
    fn strategy(&self) -> WatchStrategy {
        WatchStrategy::Event
    }

    fn wait(&mut self, stop: &Receiver<()>) -> Wake {
        loop {
            crossbeam::select! {
                recv(stop) -> _ => return Wake::Stop,
                recv(self.events) -> msg => match msg {
                    Ok(Ok(event)) if self.is_relevant(&event) => {
                        // one rescan covers everything already queued
                        let coalesced = self.events.try_iter().count();
                        tracing::trace!(coalesced, "filesystem change");
                        return Wake::Changed;
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => tracing::warn!(error = %err, "watch backend error"),
                    Err(_) => return Wake::Stop,
                },
            }
        }
    }
}

struct Worker {
    root: Option<PathBuf>,
    discovery: Discovery,
    callback: WatchCallback,
    active: Arc<AtomicBool>,
}

impl Worker {
    fn run(self, mut backend: Box<dyn WatchBackend>, stop: Receiver<()>) {
        tracing::info!(root = ?self.root, strategy = %backend.strategy(), "watch started");
        while backend.wait(&stop) == Wake::Changed && self.is_active() {
            self.guarded("rescan", || self.rescan());
        }
        tracing::info!(root = ?self.root, "watch stopped");
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn rescan(&self) {
        let root = self.root.as_deref();
        let map = self.discovery.scan(root);
        let cache = self.discovery.cache();
        let Some(changed) = cache.replace_if_changed(root, KeyBy::Path, map, || self.is_active())
        else {
            return;
        };
        cache.remove(root, KeyBy::Name);
        tracing::info!(root = ?self.root, scripts = changed.len(), "scripts changed");
        let callback: &dyn Fn(Arc<ScriptMap>) = self.callback.as_ref();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(changed))) {
            tracing::error!(
                root = ?self.root,
                panic = %panic_message(panic.as_ref()),
                "watch callback panicked"
            );
        }
    }

    fn guarded(&self, stage: &str, f: impl FnOnce()) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
            tracing::error!(
                root = ?self.root,
                stage,
                panic = %panic_message(panic.as_ref()),
                "watch worker panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

struct WatchHandle {
    stop: Sender<()>,
    active: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl WatchHandle {
    fn shutdown(self, root: Option<&Path>, timeout: Duration) {
        self.active.store(false, Ordering::Release);
        drop(self.stop);
        let deadline = Instant::now() + timeout;
        while !self.thread.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(root = ?root, ?timeout, "watch worker did not stop in time, detaching");
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        if self.thread.join().is_err() {
            tracing::error!(root = ?root, "watch worker terminated by panic");
        }
    }
}

/// Registry of running watches, at most one per root
pub struct WatchSupervisor {
    discovery: Discovery,
    config: Arc<EngineConfig>,
    watches: Mutex<HashMap<Option<PathBuf>, WatchHandle>>,
}

impl std::fmt::Debug for WatchSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSupervisor")
            .field("watches", &self.list_watches())
            .finish_non_exhaustive()
    }
}

impl WatchSupervisor {
    /// Create a supervisor rescanning through `discovery`
    #[must_use]
    pub fn new(discovery: Discovery, config: Arc<EngineConfig>) -> Self {
        Self {
            discovery,
            config,
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching `root`, replacing any existing watch on it
    ///
    /// Returns the strategy actually running. Fails only if the worker
    /// thread cannot be spawned.
    pub fn watch(
        &self,
        root: Option<&Path>,
        callback: WatchCallback,
        interval: Duration,
    ) -> std::io::Result<WatchStrategy> {
        let key = root.map(Path::to_path_buf);
        self.unwatch(root);

        let backend = self.backend(root.unwrap_or_else(|| Path::new(".")), interval);
        let strategy = backend.strategy();
        // The backend is already listening, so anything written after this
        // returns differs from the baseline.
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.baseline(root))) {
            tracing::error!(
                root = ?root,
                panic = %panic_message(panic.as_ref()),
                "watch baseline panicked"
            );
        }
        let (stop, stop_rx) = channel::bounded(1);
        let active = Arc::new(AtomicBool::new(true));
        let worker = Worker {
            root: key.clone(),
            discovery: self.discovery.clone(),
            callback,
            active: Arc::clone(&active),
        };
        let thread = thread::Builder::new()
            .name("simscan-watch".to_string())
            .stack_size(WORKER_STACK)
            .spawn(move || worker.run(backend, stop_rx))?;

        let displaced = self.watches.lock().insert(
            key,
            WatchHandle {
                stop,
                active,
                thread,
            },
        );
        if let Some(displaced) = displaced {
            displaced.shutdown(root, self.config.join_timeout());
        }
        Ok(strategy)
    }

    /// Stop watching `root`; no-op when it is not watched
    pub fn unwatch(&self, root: Option<&Path>) {
        let handle = self.watches.lock().remove(&root.map(Path::to_path_buf));
        if let Some(handle) = handle {
            handle.shutdown(root, self.config.join_timeout());
        }
    }

    /// Roots currently watched
    #[must_use]
    pub fn list_watches(&self) -> HashSet<Option<PathBuf>> {
        self.watches.lock().keys().cloned().collect()
    }

    /// Stop every watch
    pub fn unwatch_all(&self) {
        let handles: Vec<_> = self.watches.lock().drain().collect();
        for (root, handle) in handles {
            handle.shutdown(root.as_deref(), self.config.join_timeout());
        }
    }

    /// Cache the current mapping of an uncached root
    fn baseline(&self, root: Option<&Path>) {
        let cache = self.discovery.cache();
        if cache.contains(root, KeyBy::Path) {
            return;
        }
        let map = self.discovery.scan(root);
        cache.replace_if_changed(root, KeyBy::Path, map, || true);
    }

    fn backend(&self, dir: &Path, interval: Duration) -> Box<dyn WatchBackend> {
        let strategy = self.config.watch_strategy;
        if strategy == WatchStrategy::Poll {
            return Box::new(PollingWatcher::new(interval));
        }
        match EventWatcher::start(dir, Arc::clone(&self.config)) {
            Ok(watcher) => Box::new(watcher),
            Err(err) => {
                if strategy == WatchStrategy::Event {
                    tracing::error!(dir = %dir.display(), error = %err, "event watcher unavailable, polling instead");
                } else {
                    tracing::warn!(dir = %dir.display(), error = %err, "event watcher unavailable, polling instead");
                }
                Box::new(PollingWatcher::new(interval))
            }
        }
    }
}

impl Drop for WatchSupervisor {
    fn drop(&mut self) {
        self.unwatch_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_wakes_until_stopped() {
        let (stop, stop_rx) = channel::bounded(1);
        let mut backend = PollingWatcher::new(Duration::from_millis(5));
        assert_eq!(backend.wait(&stop_rx), Wake::Changed);
        drop(stop);
        assert_eq!(backend.wait(&stop_rx), Wake::Stop);
    }

    #[test]
    fn event_backend_stops_on_signal() {
        let dir = tempfile::tempdir().unwrap();
        let Ok(mut backend) = EventWatcher::start(dir.path(), Arc::new(EngineConfig::new())) else {
            return;
        };
        let (stop, stop_rx) = channel::bounded(1);
        stop.send(()).unwrap();
        assert_eq!(backend.wait(&stop_rx), Wake::Stop);
    }

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
