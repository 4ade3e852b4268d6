use clap::Parser;
use peerpredict::cli::Args;
use peerpredict::config::NodeConfig;
use peerpredict::{logging, node};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.log_level.as_deref());

    let config = match NodeConfig::from_env() {
        Ok(config) => args.apply(config),
        Err(e) => {
            error!(error = %e, "invalid environment configuration");
            return ExitCode::FAILURE;
        }
    };

    match node::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "node failed");
            ExitCode::FAILURE
        }
    }
}
