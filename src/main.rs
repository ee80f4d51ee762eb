mod cli;
mod commands;
mod model;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::ingest::{FetchError, IngestError, RunStatus};

const EXIT_UNEXPECTED: i32 = 1;
const EXIT_PARTIAL_FAILURES: i32 = 2;
const EXIT_FETCH_FAILURE: i32 = 3;
const EXIT_STORE_UNAVAILABLE: i32 = 4;

fn main() {
    init_tracing();

    match run() {
        Ok(RunStatus::Clean) => {}
        Ok(RunStatus::PartialFailures) => std::process::exit(EXIT_PARTIAL_FAILURES),
        Err(err) => {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run() -> Result<RunStatus> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(args),
        Commands::Status(args) => commands::status::run(args).map(|()| RunStatus::Clean),
        Commands::Query(args) => commands::query::run(args).map(|()| RunStatus::Clean),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<FetchError>()) {
        EXIT_FETCH_FAILURE
    } else if err.chain().any(|cause| cause.is::<IngestError>()) {
        EXIT_STORE_UNAVAILABLE
    } else {
        EXIT_UNEXPECTED
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
