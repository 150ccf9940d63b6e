use pretty_assertions::assert_eq;
use simscan_core::{FolderOptions, ScriptManager};
use simscan_test_utils::{plain_script, simulation_script, ScriptTree};

#[test]
fn test_folders_collect_scripts_beneath_them() {
    let tree = ScriptTree::new();
    tree.write("run_b/sim.py", &simulation_script("Bravo"));
    tree.write("run_a/deep/one.py", &simulation_script("One"));
    tree.write("run_a/two.py", &simulation_script("Two"));
    tree.write("run_a/three.py", &simulation_script("Three"));
    tree.write("helpers/util.py", &plain_script());
    tree.write(".hidden/sim.py", &simulation_script("Hidden"));

    let manager = ScriptManager::new();
    let folders = manager.list_folders(tree.root(), &FolderOptions::default());

    let names: Vec<_> = folders.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["run_a", "run_b"]);
    assert_eq!(folders[0].scripts, vec!["One", "Three", "Two"]);
    assert!(folders[0].display().starts_with("One, Three (+1 more) - run_a ("));
    assert!(folders[0].size > 0);

    let all = manager.list_folders(
        tree.root(),
        &FolderOptions::default().with_scripts_only(false).with_hidden(true),
    );
    let names: Vec<_> = all.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec![".hidden", "helpers", "run_a", "run_b"]);
    assert!(all[1].scripts.is_empty());
}

#[test]
fn test_missing_root_lists_nothing() {
    let tree = ScriptTree::new();
    let manager = ScriptManager::new();
    assert!(manager
        .list_folders(&tree.root().join("absent"), &FolderOptions::default())
        .is_empty());
}
