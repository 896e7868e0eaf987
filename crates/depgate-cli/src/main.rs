//! DepGate CLI binary.
//!
//! Entry point for the `depgate` command-line tool. It initializes logging
//! via `tracing` (level from `DEPGATE_LOG_LEVEL`), parses arguments with
//! `clap`, and dispatches to the command handlers.

mod cli;
mod commands;
mod export;
mod orchestrator;
mod wrappers;

use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DEPGATE_LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
    let code = commands::dispatch(args).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
