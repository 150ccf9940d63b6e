//! Execution budgets

use serde::{Deserialize, Serialize};

/// Budgets applied while a unit's module body runs
///
/// Only code loaded from the unit's own directories is counted; library
/// code it calls into runs unmetered. Calls made later through
/// [`crate::CodeHost::call`] are not budgeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecLimits {
    /// Executed source lines
    pub max_steps: u64,
    /// Nested function calls
    pub max_call_depth: usize,
    /// Nested imports of script-local modules
    pub max_import_depth: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 100,
            max_import_depth: 16,
        }
    }
}
