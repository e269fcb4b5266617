//! Remote Demon - remote debug session orchestrator
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use remote_demon::headless::runner::output;
use remote_demon::{resolve_configuration, run_session, HeadlessEvent, RunOptions};
use rdemon_app::config::settings::init_config_dir;
use rdemon_core::logging;

/// Remote Demon - start a program on a device with debuggers attached
#[derive(Parser, Debug)]
#[command(name = "rdemon")]
#[command(about = "Remote debug session orchestrator for embedded targets", long_about = None)]
struct Args {
    /// Project directory holding .rdemon/
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Run configuration from .rdemon/launch.toml
    #[arg(long, value_name = "NAME")]
    config: Option<String>,

    /// Attach the native debugger
    #[arg(long)]
    native: bool,

    /// Attach the script (QML/JS) debugger
    #[arg(long)]
    script: bool,

    /// End the session after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Emit NDJSON events instead of plain text
    #[arg(long)]
    json: bool,

    /// Write a default .rdemon/config.toml and exit
    #[arg(long)]
    init: bool,

    /// Executable and arguments to run
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    logging::init()?;

    // Get project path from args or use current directory
    let project_path = args
        .path
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if args.init {
        init_config_dir(&project_path)?;
        eprintln!("Wrote default configuration to {}", project_path.display());
        return Ok(());
    }

    let configuration = match resolve_configuration(
        &project_path,
        args.config.as_deref(),
        &args.command,
        args.native,
        args.script,
    ) {
        Ok(configuration) => configuration,
        Err(e) if args.json => {
            output(&HeadlessEvent::error(e.to_string(), true), true);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let outcome = run_session(RunOptions {
        project_path,
        configuration,
        timeout: args.timeout.map(Duration::from_secs),
        json: args.json,
    })
    .await?;

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
