//! l3-gwmode - router gateway NAT mode management

use clap::Parser;
use l3_gwmode::audit::{init_logging, init_logging_pretty};
use l3_gwmode::cli::{run, Cli, LogFormat};
use std::process::ExitCode;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.log_format {
        LogFormat::Pretty => init_logging_pretty(&cli.log_level),
        LogFormat::Json => init_logging(&cli.log_level),
    }
    debug!("Command: {:?}", cli.command);

    let mut stdout = std::io::stdout().lock();
    match run(cli, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
