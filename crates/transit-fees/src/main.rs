//! Main entry point for the transit fees service

use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use tracing::{error, info, warn};
use transit_fees::{
    config::FeesConfig,
    logging,
    server::{shutdown_signal, FeesServer},
};

#[derive(Parser)]
#[command(
    name = "transit-fees",
    about = "Transport fee verification and booking eligibility service",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    gen_config: bool,

    /// Load and validate configuration, then exit
    #[arg(long)]
    dry_run: bool,

    /// Skip running database migrations at startup
    #[arg(long)]
    skip_migrations: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "TRANSIT_FEES_JSON_LOGS")]
    json_logs: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.gen_config {
        println!("{}", FeesConfig::generate_example()?);
        return Ok(());
    }

    let log_filter = format!("{}=info", env!("CARGO_BIN_NAME").replace('-', "_"));
    logging::init_logging(&args.verbosity, &log_filter, args.json_logs)?;

    info!("Starting transit-fees v{}", transit_fees::VERSION);

    let config = FeesConfig::load(args.config)?;
    config.validate()?;
    for warning in config.warnings() {
        warn!("{}", warning);
    }
    info!(
        "Configuration loaded for {} ({}), grace period {} days",
        config.service.service_id, config.service.environment, config.policy.grace_days
    );

    if args.dry_run {
        info!("Configuration is valid; exiting (dry run)");
        return Ok(());
    }

    let server = FeesServer::new(config).await?;
    if args.skip_migrations {
        warn!("Skipping database migrations");
    } else {
        server.run_migrations().await?;
    }

    match server.serve(shutdown_signal()).await {
        Ok(()) => {
            info!("transit-fees shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("transit-fees error: {}", e);
            Err(e)
        }
    }
}
