mod trace;

use anyhow::{Context, Result};
use richsync_config::Config;
use std::{env, path::PathBuf, process};
use trace::{Replayer, Trace};

fn usage(program: &str) -> ! {
    eprintln!("Usage: {program} replay [--json] <trace.json>");
    process::exit(1);
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("richsync-cli", String::as_str);
    let (trace_path, json) = match args.get(1..).unwrap_or_default() {
        [command, path] if command == "replay" => (PathBuf::from(path), false),
        [command, flag, path] if command == "replay" && flag == "--json" => (PathBuf::from(path), true),
        _ => usage(program),
    };

    let config = match Config::load() {
        Ok(Some(config)) => config,
        Ok(None) => Config::default(),
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let trace_path = config.resolve_trace_path(&trace_path);
    log::info!("Replaying {}", trace_path.display());
    let content = std::fs::read_to_string(&trace_path)
        .with_context(|| format!("reading trace {}", trace_path.display()))?;
    let trace: Trace = serde_json::from_str(&content)
        .with_context(|| format!("parsing trace {}", trace_path.display()))?;

    let mut replayer = Replayer::new(&trace, config.surface_options())?;
    replayer.run(&trace.steps)?;
    log::info!(
        "Replayed {} steps; final version {}",
        trace.steps.len(),
        replayer.state().version()
    );

    let dump = replayer.dump();
    if json {
        println!("{}", serde_json::to_string_pretty(&dump)?);
    } else {
        print!("{}", dump.to_text());
        println!();
        println!("{}", replayer.dom().inner_html());
    }
    Ok(())
}
