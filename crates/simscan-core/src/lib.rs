//! simscan core - discovery and live watching of simulation scripts
//!
//! Three components, each built on the previous one:
//! - [`ScriptLoader`]: sanitize, stage and execute one script in isolation
//! - [`Discovery`]: walk a root, load every candidate, memoize the mapping
//! - [`WatchSupervisor`]: keep cached mappings live and report changes
//!
//! [`ScriptManager`] wires them together behind one facade.
//!
//! # Example
//!
//! ```rust,ignore
//! use simscan_core::{KeyBy, ScriptManager};
//! use std::time::Duration;
//!
//! let manager = ScriptManager::new();
//! let by_name = manager.discover(Some(root), true, KeyBy::Name);
//!
//! manager.watch(Some(root), |scripts| println!("{} scripts", scripts.len()), Duration::from_millis(500))?;
//! // ...
//! manager.unwatch(Some(root));
//! ```

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod folders;
pub mod loader;
pub mod manager;
pub mod sanitize;
pub mod watch;

pub use cache::{invert, DiscoveryCache, KeyBy, ScriptMap};
pub use config::{EngineConfig, WatchStrategy};
pub use discovery::{display_name, Discovery};
pub use error::{ConfigError, LoadError, SkipReason};
pub use folders::{FolderInfo, FolderOptions};
pub use loader::{EntryPoint, ScriptInfo, ScriptLoader};
pub use manager::ScriptManager;
pub use watch::{EventWatcher, PollingWatcher, Wake, WatchBackend, WatchCallback, WatchSupervisor};

pub use simscan_host::{CodeHost, ExecLimits, HostError, Namespace, PythonHost, Value};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with simscan core
    pub use crate::{
        EngineConfig, FolderOptions, KeyBy, ScriptInfo, ScriptManager, ScriptMap, WatchStrategy,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
