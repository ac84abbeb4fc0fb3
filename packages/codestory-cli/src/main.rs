//! `codestory`: operator CLI over the ingestion pipeline. A thin client of
//! the orchestrator (C9) — no HTTP surface, no persistent job store; each
//! invocation builds an in-process graph/queue/LLM stand-in, runs one job
//! to completion, and reports the result.

mod color;
mod commands;
mod context;
mod progress_view;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codestory", version, about = "Code Story ingestion pipeline CLI", styles = color::styles())]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full ingestion run over a repository.
    Run(commands::run::RunArgs),
    /// Incremental ingestion run (`ingestion_update`).
    Resume(commands::resume::ResumeArgs),
    /// Probe the graph store and chat model adapters.
    Doctor(commands::doctor::DoctorArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => commands::run::handle(args).await,
        Command::Resume(args) => commands::resume::handle(args).await,
        Command::Doctor(args) => commands::doctor::handle(args).await,
    }
}
