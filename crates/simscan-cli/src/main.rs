use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use simscan_cli::{command, init_tracing, interval_from_secs, load_config, render_folders, render_info, render_scripts};
use simscan_core::{FolderOptions, KeyBy, ScriptManager, ScriptMap, WatchStrategy};

fn main() -> anyhow::Result<()> {
    let matches = command().get_matches();
    init_tracing(matches.get_one::<String>("log-format").map(String::as_str) == Some("json"));
    let mut config = load_config(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

    match matches.subcommand() {
        Some(("list", args)) => {
            let manager = ScriptManager::with_config(config);
            let root = args.get_one::<PathBuf>("root").map(PathBuf::as_path);
            let key_by = if args.get_flag("by-name") { KeyBy::Name } else { KeyBy::Path };
            let scripts = manager.discover(root, false, key_by);
            print!("{}", render_scripts(&scripts, args.get_flag("json"))?);
        }
        Some(("inspect", args)) => {
            let Some(path) = args.get_one::<PathBuf>("path") else {
                anyhow::bail!("missing script path");
            };
            let manager = ScriptManager::with_config(config);
            let info = manager
                .load(path)
                .with_context(|| format!("inspecting {}", path.display()))?;
            print!("{}", render_info(&info, &manager.config().name_key, args.get_flag("json"))?);
            if !info.is_simulation() {
                std::process::exit(1);
            }
        }
        Some(("watch", args)) => {
            if let Some(strategy) = args.get_one::<WatchStrategy>("strategy") {
                config = config.with_watch_strategy(*strategy);
            }
            let interval = match args.get_one::<f64>("interval") {
                Some(secs) => interval_from_secs(*secs)?,
                None => config.poll_interval(),
            };
            let manager = ScriptManager::with_config(config);
            let root = args.get_one::<PathBuf>("root").map(PathBuf::as_path);

            let initial = manager.discover(root, true, KeyBy::Path);
            print!("{}", render_scripts(&initial, false)?);
            let strategy = manager
                .watch(
                    root,
                    |scripts: Arc<ScriptMap>| match render_scripts(&scripts, false) {
                        Ok(text) => println!("--- {} scripts\n{text}", scripts.len()),
                        Err(err) => tracing::error!(error = %err, "render failed"),
                    },
                    interval,
                )
                .context("starting watch")?;
            tracing::info!(%strategy, "watching; close stdin to stop");

            // block until stdin reaches EOF; Ctrl-C ends the process
            let mut sink = Vec::new();
            if let Err(err) = std::io::stdin().read_to_end(&mut sink) {
                tracing::warn!(error = %err, "stdin closed with an error; stopping watch");
            }
            manager.unwatch_all();
        }
        Some(("folders", args)) => {
            let Some(root) = args.get_one::<PathBuf>("root") else {
                anyhow::bail!("missing folder root");
            };
            let options = FolderOptions::default()
                .with_scripts_only(!args.get_flag("all"))
                .with_hidden(args.get_flag("show-hidden"));
            let folders = ScriptManager::with_config(config).list_folders(root, &options);
            print!("{}", render_folders(&folders, args.get_flag("json"))?);
        }
        _ => {}
    }
    Ok(())
}
