//! p2pc CLI binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use p2pc_cli::cli::{Cli, Commands};
use p2pc_cli::commands::{CheckConfigCommand, SimulateCommand};
use p2pc_cli::output::OutputFormat;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), p2pc_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::CheckConfig { path } => {
            CheckConfigCommand::new(path).execute(&mut stdout, &format)?;
        }
        Commands::Simulate(args) => {
            SimulateCommand::new()
                .execute(&mut stdout, &format, &args)
                .await?;
        }
    }

    Ok(())
}
