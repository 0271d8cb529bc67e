//! mTLS Relay command line tool
//!
//! Takes a single argument, the path of the JSON configuration file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use mtls_relay::common::init_logger;
use mtls_relay::common::log::DEFAULT_LOG_LEVEL;
use mtls_relay::config::log_config;
use mtls_relay::{ConfigLoader, Proxy, Result, APP_NAME, VERSION};

/// Config-driven TCP relay with optional mutual TLS on either side
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    config: PathBuf,
}

async fn run(args: Args) -> Result<()> {
    info!("Starting {} v{}", APP_NAME, VERSION);

    let config = ConfigLoader::load(&args.config)?;
    log_config(&config);

    let proxy = Proxy::from_config(&config).await?;

    info!("Relay ready, press Ctrl+C to stop");

    tokio::select! {
        result = proxy.run() => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args = Args::parse();

    init_logger(DEFAULT_LOG_LEVEL);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
