//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `widget_runtime_core` linkage without a host toolkit.
//! - Drive one bundle through start, surface creation and invalidate with
//!   the headless presenter, printing deterministic output.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use widget_runtime_core::{
    builtin_catalog, core_version, init_logging, ping, BundleLoader, BundleLocation,
    CompositeBundleSource, HeadlessPresenter, PropertySet, RuntimeConfig, RuntimeController,
};

#[derive(Parser)]
#[command(
    name = "widget-runtime",
    version,
    about = "Headless smoke probe for the widget runtime"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print core ping and version.
    Probe,
    /// Load a bundle, create surfaces and tear everything down.
    Run {
        /// Bundle location (`file:<path>`, bare path).
        bundle: String,
        /// Module to instantiate, optionally `Name={"json": "props"}`. Repeatable.
        #[arg(short, long = "surface")]
        surfaces: Vec<String>,
        /// Absolute directory for rolling log files.
        #[arg(long)]
        log_dir: Option<String>,
        /// Log level (`trace|debug|info|warn|error`).
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Probe => {
            println!("widget_runtime_core ping={}", ping());
            println!("widget_runtime_core version={}", core_version());
            Ok(())
        }
        Command::Run {
            bundle,
            surfaces,
            log_dir,
            log_level,
        } => cmd_run(&bundle, &surfaces, log_dir.as_deref(), &log_level),
    }
}

fn cmd_run(bundle: &str, surfaces: &[String], log_dir: Option<&str>, level: &str) -> Result<()> {
    if let Some(dir) = log_dir {
        init_logging(level, dir).context("initialize logging")?;
    }

    let location =
        BundleLocation::parse(bundle).ok_or_else(|| anyhow!("bundle location is empty"))?;
    let presenter = Arc::new(HeadlessPresenter::new());
    let loader = BundleLoader::new(
        Arc::new(CompositeBundleSource::default()),
        builtin_catalog().context("register built-in logic")?,
    );
    let runtime =
        RuntimeController::new(location, loader, presenter.clone(), RuntimeConfig::from_env());

    runtime
        .start()
        .with_context(|| format!("start runtime for {}", runtime.location()))?;
    println!("bundle={}", runtime.location());
    println!("modules={}", runtime.module_names().join(","));

    let mut handles = Vec::new();
    for arg in surfaces {
        let (module, props) = parse_surface_arg(arg)?;
        match runtime.create_surface(module, props) {
            Ok(handle) => {
                println!(
                    "surface module={} id={} token={}",
                    handle.module(),
                    handle.id(),
                    handle.primitive_token()
                );
                handles.push(handle);
            }
            Err(err) => println!("surface module={module} error={} message={err}", err.code()),
        }
    }

    println!("live_surfaces={}", runtime.live_surface_count());
    runtime.invalidate();
    println!(
        "state={} released={} leaked={}",
        runtime.state(),
        presenter.released_total(),
        presenter.live_count()
    );
    Ok(())
}

fn parse_surface_arg(raw: &str) -> Result<(&str, PropertySet)> {
    let (module, props) = match raw.split_once('=') {
        Some((module, json)) => (module.trim(), json),
        None => (raw.trim(), ""),
    };
    if module.is_empty() {
        return Err(anyhow!("surface argument `{raw}` has no module name"));
    }
    let props = PropertySet::from_json_str(props)
        .with_context(|| format!("parse props for `{module}`"))?;
    Ok((module, props))
}

#[cfg(test)]
mod tests {
    use super::parse_surface_arg;

    #[test]
    fn surface_args_split_module_and_props() {
        let (module, props) = parse_surface_arg(r#"Clock={"zone":"UTC"}"#).expect("parse");
        assert_eq!(module, "Clock");
        assert_eq!(props.len(), 1);

        let (module, props) = parse_surface_arg(" List ").expect("parse");
        assert_eq!(module, "List");
        assert!(props.is_empty());
    }

    #[test]
    fn surface_args_reject_blank_module() {
        assert!(parse_surface_arg("={}").is_err());
        assert!(parse_surface_arg(r#"Clock={"zone": null}"#).is_err());
    }
}
