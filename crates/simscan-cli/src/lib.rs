//! `simscan` command line front end
//!
//! Argument definitions, logging setup and output rendering. The binary in
//! `main.rs` only dispatches.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use serde::Serialize;
use simscan_core::{display_name, EngineConfig, FolderInfo, ScriptInfo, ScriptMap, WatchStrategy};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "simscan=info";

pub fn command() -> Command {
    Command::new("simscan")
        .version(simscan_core::VERSION)
        .about("Discover, inspect and watch simulation scripts")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("TOML engine configuration"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format"),
        )
        .subcommand(
            Command::new("list")
                .about("List simulation scripts under a root")
                .arg(root_arg())
                .arg(
                    Arg::new("by-name")
                        .long("by-name")
                        .action(ArgAction::SetTrue)
                        .help("Key the listing by display name"),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("inspect")
                .about("Load one script and show what it exposes")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Script to load"),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("watch")
                .about("Print the script mapping each time it changes")
                .arg(root_arg())
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_parser(value_parser!(f64))
                        .help("Polling interval in seconds"),
                )
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .value_parser(value_parser!(WatchStrategy))
                        .help("auto, event or poll"),
                ),
        )
        .subcommand(
            Command::new("folders")
                .about("List sub-directories with their scripts and sizes")
                .arg(
                    Arg::new("root")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to list"),
                )
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Include folders without scripts"),
                )
                .arg(
                    Arg::new("show-hidden")
                        .long("show-hidden")
                        .action(ArgAction::SetTrue)
                        .help("Include folders starting with '.'"),
                )
                .arg(json_arg()),
        )
}

fn root_arg() -> Arg {
    Arg::new("root")
        .value_parser(value_parser!(PathBuf))
        .help("Directory to scan (current directory when omitted)")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON")
}

/// Install the global subscriber; logs go to stderr
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Engine configuration from `path`, or the defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Seconds on the command line to a polling interval
pub fn interval_from_secs(secs: f64) -> anyhow::Result<Duration> {
    anyhow::ensure!(secs.is_finite() && secs > 0.0, "interval must be positive, got {secs}");
    Ok(Duration::from_secs_f64(secs))
}

/// `<key>\t<value>` lines, or a JSON object
pub fn render_scripts(scripts: &ScriptMap, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(scripts)?);
    }
    let mut out = String::new();
    for (key, value) in scripts {
        writeln!(out, "{key}\t{value}")?;
    }
    Ok(out)
}

#[derive(Debug, Serialize)]
struct Inspection<'a> {
    path: &'a Path,
    name: String,
    simulation: bool,
    entry_point: Option<&'a str>,
    parameters: Vec<String>,
    skipped: Option<String>,
}

/// Summary of one loaded script
pub fn render_info(info: &ScriptInfo, name_key: &str, json: bool) -> anyhow::Result<String> {
    let inspection = Inspection {
        path: &info.path,
        name: display_name(info, name_key),
        simulation: info.is_simulation(),
        entry_point: info.optics_entry.as_ref().map(|entry| entry.name()),
        parameters: info
            .parameters
            .iter()
            .flatten()
            .map(simscan_core::Value::py_repr)
            .collect(),
        skipped: info.skip_reason.as_ref().map(ToString::to_string),
    };
    if json {
        return Ok(serde_json::to_string_pretty(&inspection)?);
    }
    let mut out = String::new();
    writeln!(out, "path:        {}", inspection.path.display())?;
    writeln!(out, "name:        {}", inspection.name)?;
    writeln!(out, "entry point: {}", inspection.entry_point.unwrap_or("-"))?;
    if let Some(reason) = &inspection.skipped {
        writeln!(out, "skipped:     {reason}")?;
    }
    writeln!(out, "parameters:  {}", inspection.parameters.len())?;
    for record in &inspection.parameters {
        writeln!(out, "  {record}")?;
    }
    Ok(out)
}

/// One display line per folder, or a JSON array
pub fn render_folders(folders: &[FolderInfo], json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(folders)?);
    }
    let mut out = String::new();
    for folder in folders {
        writeln!(out, "{folder}")?;
    }
    Ok(out)
}
