//! Engine configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! extensions = ["py"]
//! entry_point = "set_optics"
//! watch_strategy = "poll"
//! poll_interval_ms = 250
//!
//! [limits]
//! max_steps = 200000
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simscan_host::ExecLimits;

use crate::error::ConfigError;

/// How a watch observes its root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStrategy {
    /// Filesystem events, falling back to polling
    #[default]
    Auto,
    /// Filesystem events; falling back to polling is an error-level event
    Event,
    /// Always poll
    Poll,
}

impl fmt::Display for WatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Event => "event",
            Self::Poll => "poll",
        })
    }
}

impl FromStr for WatchStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "event" | "events" => Ok(Self::Event),
            "poll" | "polling" => Ok(Self::Poll),
            other => Err(ConfigError::Invalid(format!(
                "unknown watch strategy '{other}' (expected auto, event or poll)"
            ))),
        }
    }
}

/// Configuration of the loader, discovery and watch components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File extensions considered during discovery (without the dot)
    pub extensions: Vec<String>,
    /// Module binding that marks a simulation script
    pub entry_point: String,
    /// Module binding holding parameter records
    pub parameters_binding: String,
    /// First element of the parameter record carrying the display name
    pub name_key: String,
    /// Bare top-level calls removed before execution
    pub stripped_calls: Vec<String>,
    /// Prefix of per-load temp directories
    pub temp_prefix: String,
    /// Parent of per-load temp directories (system temp when unset)
    pub temp_root: Option<PathBuf>,
    /// Import search paths appended after the script's own directory
    pub extra_search_paths: Vec<PathBuf>,
    /// Watch backend selection
    pub watch_strategy: WatchStrategy,
    /// Polling interval (and default watch interval) in milliseconds
    pub poll_interval_ms: u64,
    /// Bound on joining a stopped watch worker, in milliseconds
    pub join_timeout_ms: u64,
    /// Interpreter budgets
    pub limits: ExecLimits,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return invalid("extensions must name at least one extension");
        }
        if self.entry_point.trim().is_empty() {
            return invalid("entry_point must not be empty");
        }
        if self.parameters_binding.trim().is_empty() {
            return invalid("parameters_binding must not be empty");
        }
        if self.name_key.is_empty() {
            return invalid("name_key must not be empty");
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be greater than zero");
        }
        if self.join_timeout_ms == 0 {
            return invalid("join_timeout_ms must be greater than zero");
        }
        if self.limits.max_steps == 0
            || self.limits.max_call_depth == 0
            || self.limits.max_import_depth == 0
        {
            return invalid("execution limits must be greater than zero");
        }
        Ok(())
    }

    /// With discovery extensions
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// With entry point name
    #[inline]
    #[must_use]
    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    /// With parameter binding name
    #[inline]
    #[must_use]
    pub fn with_parameters_binding(mut self, name: impl Into<String>) -> Self {
        self.parameters_binding = name.into();
        self
    }

    /// With the set of stripped top-level calls
    #[must_use]
    pub fn with_stripped_calls<I, S>(mut self, calls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stripped_calls = calls.into_iter().map(Into::into).collect();
        self
    }

    /// With parent directory for temp staging
    #[inline]
    #[must_use]
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// With an additional import search path
    #[inline]
    #[must_use]
    pub fn with_extra_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_search_paths.push(path.into());
        self
    }

    /// With watch strategy
    #[inline]
    #[must_use]
    pub fn with_watch_strategy(mut self, strategy: WatchStrategy) -> Self {
        self.watch_strategy = strategy;
        self
    }

    /// With polling interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    /// With join timeout
    #[inline]
    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_ms = duration_ms(timeout);
        self
    }

    /// With interpreter budgets
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: ExecLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Polling interval
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Join timeout for watch teardown
    #[inline]
    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Whether `path` has one of the configured extensions
    #[must_use]
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_string()],
            entry_point: "set_optics".to_string(),
            parameters_binding: "varParam".to_string(),
            name_key: "name".to_string(),
            stripped_calls: vec!["main".to_string(), "epilogue".to_string()],
            temp_prefix: "simscan_".to_string(),
            temp_root: None,
            extra_search_paths: Vec::new(),
            watch_strategy: WatchStrategy::Auto,
            poll_interval_ms: 500,
            join_timeout_ms: 1_000,
            limits: ExecLimits::default(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.entry_point, "set_optics");
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            extensions = [".py", "pyw"]
            watch_strategy = "poll"
            stripped_calls = ["main"]

            [limits]
            max_steps = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.watch_strategy, WatchStrategy::Poll);
        assert_eq!(config.stripped_calls, vec!["main"]);
        assert_eq!(config.limits.max_steps, 5000);
        assert_eq!(config.limits.max_call_depth, ExecLimits::default().max_call_depth);
        assert!(config.matches_extension(Path::new("a/b.py")));
        assert!(config.matches_extension(Path::new("a/b.PYW")));
        assert!(!config.matches_extension(Path::new("a/b.txt")));
        assert!(!config.matches_extension(Path::new("a/py")));
    }

    #[test]
    fn validation_rejects_unusable_values() {
        for doc in [
            "extensions = []",
            "entry_point = ''",
            "poll_interval_ms = 0",
            "join_timeout_ms = 0",
            "[limits]\nmax_steps = 0",
        ] {
            assert!(
                matches!(EngineConfig::from_toml_str(doc), Err(ConfigError::Invalid(_))),
                "{doc}"
            );
        }
        assert!(matches!(
            EngineConfig::from_toml_str("extensions = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("Poll".parse::<WatchStrategy>().unwrap(), WatchStrategy::Poll);
        assert_eq!("event".parse::<WatchStrategy>().unwrap(), WatchStrategy::Event);
        assert!("inotify".parse::<WatchStrategy>().is_err());
        assert_eq!(WatchStrategy::Auto.to_string(), "auto");
    }

    #[test]
    fn builders_compose() {
        let config = EngineConfig::new()
            .with_entry_point("setup")
            .with_poll_interval(Duration::from_millis(20))
            .with_watch_strategy(WatchStrategy::Poll)
            .with_extra_search_path("/opt/lib");
        assert_eq!(config.entry_point, "setup");
        assert_eq!(config.poll_interval_ms, 20);
        assert_eq!(config.extra_search_paths, vec![PathBuf::from("/opt/lib")]);
        assert!(config.validate().is_ok());
    }
}
