// ABOUTME: Entry point for the skyplan CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::ExplainArgs;
use skyplan::config;
use skyplan::error::Result;
use skyplan::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);
    let result = run(cli, mode).await;

    if let Err(e) = result {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init { force } => {
            let path = config::init_config(&cwd, force)?;
            output.success(&format!("Created {}", path.display()));
            Ok(())
        }
        Commands::Analyze { manifest, optimize } => commands::analyze(&manifest, optimize, output),
        Commands::Deploy { manifest } => commands::deploy(&manifest, &cwd, output).await,
        Commands::Status { deployment_id } => commands::status(&deployment_id, &cwd, output).await,
        Commands::Resume { deployment_id } => commands::resume(&deployment_id, &cwd, output).await,
        Commands::Cancel { deployment_id } => commands::cancel(&deployment_id, &cwd, output).await,
        Commands::Explain {
            message,
            code,
            resource_type,
            location,
            sku,
        } => commands::explain(
            ExplainArgs {
                message,
                code,
                resource_type,
                location,
                sku,
            },
            output,
        ),
    }
}
