//! dystrack: adaptive-feedback microscopy manager binary.
//!
//! `run` watches a target directory and steers the microscope; `tail`
//! follows the coordinate file of a running session.

use clap::Parser;

mod cli;
mod cmd_run;
mod cmd_tail;
mod config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);

    match args.command {
        cli::Command::Run(opts) => cmd_run::cmd_run(opts).await,
        cli::Command::Tail(opts) => cmd_tail::cmd_tail(opts).await,
    }
}

/// Diagnostics go to stderr; stdout carries the progress lines.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = std::env::var("DYSTRACK_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}
