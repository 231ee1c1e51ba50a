//! Random Beacon Client
//!
//! Runs a beacon participant against an in-memory relay chain, with the rest
//! of the network simulated.

mod config;
mod shutdown;
mod simulator;

use beacon_core::beacon;
use beacon_core::chain::local::LocalChain;
use clap::Parser;
use config::ConfigLoader;
use shutdown::shutdown_signal;
use simulator::Simulator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Random beacon client - threshold relay participant
#[derive(Parser, Debug)]
#[command(name = "beacon-client")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./beacon-config.toml", env = "BEACON_CONFIG")]
    config: PathBuf,

    /// Override the staker address (0x-prefixed hex)
    #[arg(short, long, env = "BEACON_STAKER")]
    staker: Option<String>,

    /// Do not simulate relay requests; only blocks are produced
    #[arg(long, default_value = "false")]
    no_simulation: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting beacon-client v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.staker);
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let staker = loaded_config.node.staker;
    let chain = Arc::new(LocalChain::new(loaded_config.chain.clone()));
    chain.stake(staker, loaded_config.node.stake.clone()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = chain.spawn_block_ticker(loaded_config.block_time, shutdown_rx.clone());

    let simulation = if args.no_simulation {
        tracing::info!("Relay simulation disabled");
        None
    } else {
        let mut simulator = Simulator::new(chain.as_ref().clone(), loaded_config.simulation);
        simulator.stake_competitors().await;
        Some(tokio::spawn(simulator.run(shutdown_rx.clone())))
    };

    // Run the beacon until it fails or a signal arrives
    let mut beacon = tokio::spawn(beacon::initialize(chain.clone(), staker, shutdown_rx));
    let result = tokio::select! {
        joined = &mut beacon => joined,
        signal = shutdown_signal() => {
            signal?;
            let _ = shutdown_tx.send(true);
            beacon.await
        }
    };

    // Stop background tasks whichever way the beacon ended
    let _ = shutdown_tx.send(true);
    if let Some(simulation) = simulation {
        if let Err(e) = simulation.await {
            tracing::warn!("Simulator task failed: {}", e);
        }
    }
    if let Err(e) = ticker.await {
        tracing::warn!("Block ticker task failed: {}", e);
    }

    result?.map_err(|e| {
        tracing::error!("Beacon failed: {}", e);
        e
    })?;
    tracing::info!("Beacon client shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
