//! labnet CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use labnet_cli::commands::{dispatch, exit_code, Cli};
use labnet_core::LeaseError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    if let Err(e) = dispatch(cli).await {
        if let Some(err) = e.downcast_ref::<LeaseError>() {
            tracing::debug!(kind = err.kind(), retryable = err.is_retryable(), "Command failed");
        }
        eprintln!("Error: {e}");
        std::process::exit(exit_code(e.as_ref()));
    }
}
