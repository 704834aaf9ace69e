use dlfleet_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    match logging::init_logging() {
        Ok(path) => tracing::debug!("log file: {}", path.display()),
        Err(err) => {
            logging::init_logging_stderr();
            tracing::warn!("file logging unavailable ({:#}), logging to stderr", err);
        }
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("dlfleet error: {:#}", err);
        std::process::exit(1);
    }
}
