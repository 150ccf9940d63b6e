//! simscan host - isolated execution of Python simulation scripts
//!
//! Provides the [`CodeHost`] capability used by the discovery engine:
//! - Parse Python source into an owned syntax tree (tree-sitter-python)
//! - Regenerate source text from a (possibly filtered) tree
//! - Execute a module under a unique name in the embedded CPython
//!   interpreter (pyo3), with a line budget on the module body
//! - Call a function bound in the resulting namespace
//!
//! # Example
//!
//! ```rust,ignore
//! use simscan_host::{CodeHost, ExecUnit, PythonHost};
//!
//! let host = PythonHost::default();
//! let module = host.parse("def optics():\n    return [1, 2]\n")?;
//! let source = host.unparse(&module)?;
//! std::fs::write(&path, source)?;
//!
//! let namespace = host.execute(&ExecUnit::new(&path, vec![dir]))?;
//! let value = host.call(&namespace, "optics", Vec::new())?;
//! ```

#![allow(missing_docs)]

pub mod ast;
pub mod error;
mod limits;
mod lower;
mod python;
pub mod value;

use std::path::PathBuf;

pub use ast::{Expr, Module, Stmt, StmtKind};
pub use error::{HostError, HostResult};
pub use limits::ExecLimits;
pub use python::PythonHost;
pub use value::{HostObject, Namespace, Value};

/// Prefix of every isolated unit name
pub const UNIT_PREFIX: &str = "_simscan_";

/// A file to execute in isolation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecUnit {
    /// Unique module name; never shared between units
    pub name: String,
    /// File holding the source to execute
    pub path: PathBuf,
    /// Directories searched for imports, in order
    pub search_path: Vec<PathBuf>,
}

impl ExecUnit {
    /// Unit with a fresh unique name
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, search_path: Vec<PathBuf>) -> Self {
        Self {
            name: format!("{UNIT_PREFIX}{}", uuid::Uuid::new_v4().simple()),
            path: path.into(),
            search_path,
        }
    }
}

/// Capability to parse, regenerate and run Python source
///
/// Implementations must be shareable across threads: the discovery engine
/// calls a single host from caller threads and watcher workers alike.
pub trait CodeHost: Send + Sync {
    /// Parse source text into a syntax tree
    fn parse(&self, source: &str) -> HostResult<Module>;

    /// Regenerate source text from a syntax tree
    fn unparse(&self, module: &Module) -> HostResult<String>;

    /// Execute a unit in isolation and return its namespace
    fn execute(&self, unit: &ExecUnit) -> HostResult<Namespace>;

    /// Call the binding `name` of `namespace` with positional arguments
    fn call(&self, namespace: &Namespace, name: &str, args: Vec<Value>) -> HostResult<Value>;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_names_are_unique() {
        let a = ExecUnit::new("a.py", Vec::new());
        let b = ExecUnit::new("a.py", Vec::new());
        assert!(a.name.starts_with(UNIT_PREFIX));
        assert_ne!(a.name, b.name);
    }

    #[test]
    fn call_rejects_missing_and_non_callable() {
        let host = PythonHost::new();
        let ns = Namespace::new("_simscan_t", None, Vec::new())
            .with_bindings([("params".to_string(), Value::Int(1))].into_iter().collect());
        assert!(matches!(
            host.call(&ns, "optics", Vec::new()),
            Err(HostError::NotCallable(name)) if name == "optics"
        ));
        assert!(matches!(
            host.call(&ns, "params", Vec::new()),
            Err(HostError::NotCallable(name)) if name == "params"
        ));
    }

    #[test]
    fn parse_then_unparse() {
        let host = PythonHost::new();
        let module = host.parse("x = 1\nprint(x)\n").unwrap();
        let text = host.unparse(&module).unwrap();
        assert!(text.contains("x = 1"));
        assert!(text.contains("print(x)"));
    }
}
