//! Embedded CPython host
//!
//! Units run in the process-wide interpreter that pyo3 starts on first
//! use. `runner.py` does the isolation work on the Python side: it puts the
//! unit's search path on `sys.path`, loads the file under its unique name
//! with `importlib`, meters the module body with a trace function, and
//! restores `sys.path`/`sys.modules` on every exit path.

use std::path::Path;

use indexmap::IndexMap;
use parking_lot::Mutex;
use pyo3::ffi::c_str;
use pyo3::prelude::*;
use pyo3::sync::GILOnceCell;
use pyo3::types::{PyBool, PyDict, PyFloat, PyFrozenSet, PyInt, PyList, PySet, PyString, PyTuple};
use pyo3::IntoPyObjectExt;

use crate::error::{HostError, HostResult};
use crate::limits::ExecLimits;
use crate::value::{HostObject, Namespace, Value};
use crate::{lower, CodeHost, ExecUnit, Module};

static RUNNER: GILOnceCell<Py<PyModule>> = GILOnceCell::new();

/// Serializes loads: `sys.path`, `sys.modules` and the trace hook are
/// interpreter-global. Always taken before the GIL.
static LOAD_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Containers nested deeper than this stay [`Value::Object`]
const MAX_NESTING: usize = 32;

/// Target for text a script prints
const SCRIPT_TARGET: &str = "simscan::script";

/// [`CodeHost`] backed by the embedded CPython interpreter
#[derive(Debug, Clone, Default)]
pub struct PythonHost {
    limits: ExecLimits,
}

impl PythonHost {
    /// Host with default limits
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with explicit execution limits
    #[inline]
    #[must_use]
    pub fn with_limits(limits: ExecLimits) -> Self {
        Self { limits }
    }

    /// Limits applied to every module body
    #[inline]
    #[must_use]
    pub fn limits(&self) -> &ExecLimits {
        &self.limits
    }

    fn load<'py>(
        &self,
        py: Python<'py>,
        runner: &Bound<'py, PyModule>,
        unit: &ExecUnit,
    ) -> HostResult<Namespace> {
        let mut roots = unit.search_path.clone();
        if let Some(dir) = unit.path.parent() {
            roots.push(dir.to_path_buf());
        }
        let loaded = runner.getattr("load").and_then(|load| {
            load.call1((
                unit.name.as_str(),
                unit.path.as_path(),
                unit.search_path.clone(),
                roots,
                self.limits.max_steps,
                self.limits.max_call_depth,
                self.limits.max_import_depth,
            ))
        });
        let (bindings, output) = loaded
            .and_then(|result| result.extract::<(Bound<'py, PyDict>, String)>())
            .map_err(|err| self.map_error(py, runner, &err, &unit.path))?;
        log_output(&unit.name, &output);

        let mut values = IndexMap::with_capacity(bindings.len());
        for (key, value) in bindings.iter() {
            if let Ok(name) = key.downcast::<PyString>() {
                values.insert(name.to_string_lossy().into_owned(), to_value(&value));
            }
        }
        Ok(
            Namespace::new(unit.name.clone(), Some(unit.path.clone()), unit.search_path.clone())
                .with_bindings(values),
        )
    }

    fn map_error(
        &self,
        py: Python<'_>,
        runner: &Bound<'_, PyModule>,
        err: &PyErr,
        path: &Path,
    ) -> HostError {
        let raised = |class: &str| {
            runner
                .getattr(class)
                .is_ok_and(|class| err.is_instance(py, &class))
        };
        if raised("StepLimitExceeded") {
            return HostError::StepLimit {
                limit: self.limits.max_steps,
            };
        }
        if raised("CallDepthExceeded") {
            return HostError::RecursionLimit {
                limit: self.limits.max_call_depth,
            };
        }
        if raised("ImportDepthExceeded") {
            return HostError::ImportLimit {
                limit: self.limits.max_import_depth,
            };
        }
        exception_error(py, runner, err, path)
    }
}

impl CodeHost for PythonHost {
    fn parse(&self, source: &str) -> HostResult<Module> {
        lower::parse_module(source)
    }

    fn unparse(&self, module: &Module) -> HostResult<String> {
        lower::unparse_module(module)
    }

    fn execute(&self, unit: &ExecUnit) -> HostResult<Namespace> {
        std::fs::metadata(&unit.path).map_err(|e| HostError::io_error(&unit.path, &e))?;

        let _guard = LOAD_LOCK.lock();
        Python::with_gil(|py| {
            let runner = runner(py)?;
            let result = self.load(py, runner, unit);
            tracing::trace!(
                unit = %unit.name,
                path = %unit.path.display(),
                ok = result.is_ok(),
                "unit executed"
            );
            result
        })
    }

    fn call(&self, namespace: &Namespace, name: &str, args: Vec<Value>) -> HostResult<Value> {
        let Some(Value::Object(callee)) = namespace.get(name).filter(|v| v.is_callable()) else {
            return Err(HostError::NotCallable(name.to_string()));
        };
        Python::with_gil(|py| {
            let runner = runner(py)?;
            let path = namespace.file().unwrap_or_else(|| Path::new(""));
            let invoked = args
                .iter()
                .map(|arg| to_python(py, arg))
                .collect::<PyResult<Vec<_>>>()
                .and_then(|args| PyTuple::new(py, args))
                .and_then(|args| {
                    runner
                        .getattr("invoke")?
                        .call1((callee.bind(py), args))?
                        .extract::<(Bound<'_, PyAny>, String)>()
                });
            match invoked {
                Ok((result, output)) => {
                    log_output(namespace.name(), &output);
                    Ok(to_value(&result))
                }
                Err(err) => Err(exception_error(py, runner, &err, path)),
            }
        })
    }
}

fn runner(py: Python<'_>) -> HostResult<&Bound<'_, PyModule>> {
    RUNNER
        .get_or_try_init(py, || {
            PyModule::from_code(
                py,
                c_str!(include_str!("runner.py")),
                c_str!("<simscan-runner>"),
                c_str!("simscan_runner"),
            )
            .map(Bound::unbind)
        })
        .map(|module| module.bind(py))
        .map_err(|err| HostError::Interpreter(err.to_string()))
}

fn exception_error(
    py: Python<'_>,
    runner: &Bound<'_, PyModule>,
    err: &PyErr,
    path: &Path,
) -> HostError {
    let kind = err
        .get_type(py)
        .name()
        .map_or_else(|_| "Exception".to_string(), |n| n.to_string_lossy().into_owned());
    let message = err
        .value(py)
        .str()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let line = runner
        .getattr("error_line")
        .and_then(|f| f.call1((err.value(py), path)))
        .and_then(|line| line.extract::<usize>())
        .unwrap_or(0);
    HostError::exception(kind, message, line)
}

fn log_output(unit: &str, output: &str) {
    for line in output.lines() {
        tracing::debug!(target: SCRIPT_TARGET, unit, "{line}");
    }
}

/// Copy an interpreter object out as a [`Value`]
pub(crate) fn to_value(object: &Bound<'_, PyAny>) -> Value {
    let mut path = Vec::new();
    convert(object, &mut path)
}

fn convert<'py>(object: &Bound<'py, PyAny>, path: &mut Vec<Bound<'py, PyAny>>) -> Value {
    if object.is_none() {
        return Value::None;
    }
    if let Ok(b) = object.downcast::<PyBool>() {
        return Value::Bool(b.is_true());
    }
    if object.is_instance_of::<PyInt>() {
        // ints beyond i64 keep their exact value as an object
        return object
            .extract::<i64>()
            .map_or_else(|_| Value::Object(HostObject::new(object)), Value::Int);
    }
    if let Ok(f) = object.downcast::<PyFloat>() {
        return Value::Float(f.value());
    }
    if let Ok(s) = object.downcast::<PyString>() {
        return Value::Str(s.to_string_lossy().into_owned());
    }
    if path.len() >= MAX_NESTING || path.iter().any(|seen| seen.is(object)) {
        return Value::Object(HostObject::new(object));
    }

    path.push(object.clone());
    let value = if let Ok(list) = object.downcast::<PyList>() {
        Value::List(list.iter().map(|item| convert(&item, path)).collect())
    } else if let Ok(tuple) = object.downcast::<PyTuple>() {
        Value::Tuple(tuple.iter().map(|item| convert(&item, path)).collect())
    } else if let Ok(dict) = object.downcast::<PyDict>() {
        Value::Dict(
            dict.iter()
                .map(|(k, v)| (convert(&k, path), convert(&v, path)))
                .collect(),
        )
    } else if let Ok(set) = object.downcast::<PySet>() {
        Value::List(set.iter().map(|item| convert(&item, path)).collect())
    } else if let Ok(set) = object.downcast::<PyFrozenSet>() {
        Value::List(set.iter().map(|item| convert(&item, path)).collect())
    } else {
        Value::Object(HostObject::new(object))
    };
    path.pop();
    value
}

fn to_python<'py>(py: Python<'py>, value: &Value) -> PyResult<Bound<'py, PyAny>> {
    match value {
        Value::None => Ok(py.None().into_bound(py)),
        Value::Bool(b) => (*b).into_bound_py_any(py),
        Value::Int(i) => (*i).into_bound_py_any(py),
        Value::Float(f) => (*f).into_bound_py_any(py),
        Value::Str(s) => s.as_str().into_bound_py_any(py),
        Value::List(items) => {
            let items = items
                .iter()
                .map(|item| to_python(py, item))
                .collect::<PyResult<Vec<_>>>()?;
            PyList::new(py, items).map(Bound::into_any)
        }
        Value::Tuple(items) => {
            let items = items
                .iter()
                .map(|item| to_python(py, item))
                .collect::<PyResult<Vec<_>>>()?;
            PyTuple::new(py, items).map(Bound::into_any)
        }
        Value::Dict(pairs) => {
            let dict = PyDict::new(py);
            for (k, v) in pairs {
                dict.set_item(to_python(py, k)?, to_python(py, v)?)?;
            }
            Ok(dict.into_any())
        }
        Value::Object(obj) => Ok(obj.bind(py).clone()),
    }
}
