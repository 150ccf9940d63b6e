//! Error types for the script host
//!
//! Covers the three host capabilities:
//! - Parsing (source → syntax tree)
//! - Regeneration (syntax tree → source)
//! - Execution (source → namespace, in the embedded interpreter)

use std::path::PathBuf;

/// Errors raised by a [`crate::CodeHost`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    /// Parser could not be initialised
    #[error("parser initialization failed: {0}")]
    ParserInit(String),

    /// Source is not valid Python
    #[error("syntax error at {line}:{column}")]
    Syntax { line: usize, column: usize },

    /// Syntax nesting exceeds what the lowering accepts
    #[error("syntax nesting too deep at line {line}")]
    TooDeep { line: usize },

    /// Module cannot be turned back into source text
    #[error("cannot regenerate source: {0}")]
    Unparse(String),

    /// Python-level exception escaped the module
    #[error("{kind}: {message} (line {line})")]
    Exception {
        kind: String,
        message: String,
        line: usize,
    },

    /// Step budget exhausted
    #[error("execution budget of {limit} steps exhausted")]
    StepLimit { limit: u64 },

    /// Call depth limit reached
    #[error("maximum call depth {limit} exceeded")]
    RecursionLimit { limit: usize },

    /// Script-local import nesting limit reached
    #[error("maximum import depth {limit} exceeded")]
    ImportLimit { limit: usize },

    /// Embedded interpreter could not provide the loader
    #[error("python interpreter unavailable: {0}")]
    Interpreter(String),

    /// Binding requested by the caller does not exist or is not callable
    #[error("'{0}' is not a callable in the namespace")]
    NotCallable(String),

    /// Reading a unit or module file failed
    #[error("io error reading {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl HostError {
    /// Create an exception error
    pub fn exception(kind: impl Into<String>, message: impl Into<String>, line: usize) -> Self {
        Self::Exception {
            kind: kind.into(),
            message: message.into(),
            line,
        }
    }

    /// Create an IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Whether a configured budget stopped the run
    #[inline]
    #[must_use]
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            Self::StepLimit { .. } | Self::RecursionLimit { .. } | Self::ImportLimit { .. }
        )
    }
}

/// Result alias for host operations
pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_display() {
        let err = HostError::exception("ValueError", "bad", 3);
        assert_eq!(err.to_string(), "ValueError: bad (line 3)");
    }

    #[test]
    fn budgets_are_limits() {
        assert!(HostError::StepLimit { limit: 10 }.is_limit());
        assert!(HostError::ImportLimit { limit: 2 }.is_limit());
        assert!(!HostError::exception("KeyError", "k", 1).is_limit());
    }
}
