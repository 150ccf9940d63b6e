//! Error types for simscan core
//!
//! Loading has a single hard failure (a missing file). Everything else a
//! script can do wrong is data-level: the script is skipped and the reason
//! is logged.

use std::path::PathBuf;

use simscan_host::HostError;

/// Hard failure of [`crate::ScriptManager::load`]
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The path does not exist
    #[error("script not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::EngineConfig`]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but are unusable
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Why a script produced no entry point
#[derive(Debug, Clone, thiserror::Error)]
pub enum SkipReason {
    /// Source could not be read as UTF-8
    #[error("unreadable source: {0}")]
    Unreadable(String),

    /// Source is not valid Python
    #[error("parse failed: {0}")]
    Parse(HostError),

    /// Sanitized copy could not be staged in a temp directory
    #[error("staging failed: {0}")]
    Staging(String),

    /// Module-level code failed
    #[error("execution failed: {0}")]
    Execution(HostError),

    /// Module ran but does not bind a callable entry point
    #[error("no callable '{0}'")]
    NoEntryPoint(String),
}

impl SkipReason {
    /// Whether the script's own code ran to completion
    #[inline]
    #[must_use]
    pub fn executed(&self) -> bool {
        matches!(self, Self::NoEntryPoint(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_path() {
        let err = LoadError::NotFound(PathBuf::from("/tmp/missing.py"));
        assert_eq!(err.to_string(), "script not found: /tmp/missing.py");
    }

    #[test]
    fn skip_reasons_render() {
        let reason = SkipReason::Execution(HostError::StepLimit { limit: 10 });
        assert!(reason.to_string().contains("10 steps"));
        assert!(!reason.executed());
        assert!(SkipReason::NoEntryPoint("set_optics".into()).executed());
    }
}
