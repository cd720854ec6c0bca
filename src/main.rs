use std::process::ExitCode;

use c4c::api::{AppError, Cli};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("c4c=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match c4c::api::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ AppError::Input(_)) => {
            error!("{e}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
