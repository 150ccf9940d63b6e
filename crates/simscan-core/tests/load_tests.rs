use std::fs;

use simscan_core::{EngineConfig, KeyBy, ScriptManager, SkipReason, Value};
use simscan_test_utils::{simulation_script, ScriptTree};

#[test]
fn test_top_level_main_call_is_not_run() {
    let tree = ScriptTree::new();
    let body = format!(
        "{}\ndef main():\n    raise RuntimeError('side effect')\n\nmain()\n",
        simulation_script("Guarded")
    );
    let path = tree.write("sim.py", &body);

    let info = ScriptManager::new().load(&path).unwrap();
    assert!(info.skip_reason.is_none(), "{:?}", info.skip_reason);
    assert!(info.is_simulation());
}

#[test]
fn test_infinite_main_is_not_run() {
    let tree = ScriptTree::new();
    let body = format!(
        "{}\ndef main():\n    while True:\n        pass\n\nmain()\nepilogue()\n",
        simulation_script("Forever")
    );
    tree.write("forever.py", &body);

    let found = ScriptManager::new().discover(Some(tree.root()), false, KeyBy::Path);
    assert_eq!(found.get(&tree.key("forever.py")).map(String::as_str), Some("Forever"));
}

#[test]
fn test_main_guard_is_not_run() {
    let tree = ScriptTree::new();
    let body = format!(
        "{}\nif __name__ == '__main__':\n    raise SystemExit(1)\n",
        simulation_script("Guard")
    );
    let path = tree.write("guard.py", &body);

    let info = ScriptManager::new().load(&path).unwrap();
    assert!(info.skip_reason.is_none(), "{:?}", info.skip_reason);
    assert!(info.is_simulation());
}

#[test]
fn test_parameters_and_entry_point() {
    let tree = ScriptTree::new();
    let path = tree.write("sim.py", &simulation_script("Params"));
    let manager = ScriptManager::new();

    let params = manager.get_parameters(&path).unwrap().unwrap();
    assert_eq!(params.len(), 2);

    let entry = manager.get_entry_point(&path).unwrap().unwrap();
    assert_eq!(entry.name(), "set_optics");
    let result = entry.call(vec![Value::None]).unwrap();
    assert_eq!(result.py_str(), "['aperture', 'lens']");
}

#[test]
fn test_custom_entry_point_name() {
    let tree = ScriptTree::new();
    let path = tree.write(
        "custom.py",
        "params = [['name', 'd', 'Custom']]\n\ndef build():\n    return 7\n",
    );
    let config = EngineConfig::default()
        .with_entry_point("build")
        .with_parameters_binding("params");
    let info = ScriptManager::with_config(config).load(&path).unwrap();

    assert!(info.is_simulation());
    assert_eq!(info.optics_entry.unwrap().call(Vec::new()).unwrap(), Value::Int(7));
}

#[test]
fn test_failed_load_reports_reason() {
    let tree = ScriptTree::new();
    let path = tree.write("bad.py", "x = undefined_name\n");

    let info = ScriptManager::new().load(&path).unwrap();
    assert!(!info.is_simulation());
    assert!(matches!(info.skip_reason, Some(SkipReason::Execution(_))));
    assert!(info.namespace.is_none());
}

#[test]
fn test_staging_area_is_cleaned() {
    let tree = ScriptTree::new();
    let staging = tempfile::tempdir().unwrap();
    tree.write("ok.py", &simulation_script("Ok"));
    tree.write("fails.py", "raise ValueError('x')\n");

    let config = EngineConfig::default().with_temp_root(staging.path());
    ScriptManager::with_config(config).discover(Some(tree.root()), false, KeyBy::Path);

    assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[test]
fn test_missing_file_is_an_error() {
    let tree = ScriptTree::new();
    assert!(ScriptManager::new().load(tree.root().join("gone.py")).is_err());
}
