use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use devicegate::api::{ApiServer, ApiState};
use devicegate::{db, Config, UpstreamClient};

/// Devicegate - payment-gated device verification gateway
#[derive(Parser)]
#[command(name = "devicegate", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "DEVICEGATE_PORT", default_value = "8787")]
    port: u16,

    /// Path to the SQLite database
    #[arg(long, env = "DEVICEGATE_DB", default_value = "devicegate.db")]
    database: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,devicegate=info",
        1 => "info,devicegate=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing::info!(
        port = cli.port,
        database = %cli.database.display(),
        upstream = %config.upstream_url,
        families = ?config.service_families,
        "starting devicegate"
    );

    let db = db::init(&cli.database)?;

    let upstream = Arc::new(UpstreamClient::new(
        config.upstream_url.clone(),
        config.upstream_api_key.clone(),
    )?);

    let state = Arc::new(ApiState::new(db, &config, upstream));
    ApiServer::new(state, cli.port).run().await?;

    Ok(())
}
