use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tokio::time;

use omnilaunch_engine::{
    config::create_example_config, ChainRegistry, DeploymentStore, EngineConfig, InMemoryStore,
    JsonRpcChainClient, RpcDexPoolCreator, ServiceError, SyncEngine,
};
use omnilaunch_types::{CurveParams, Deployment};

#[derive(Parser, Debug)]
#[command(name = "omnilaunch-engine")]
#[command(about = "Omnilaunch cross-chain virtual-liquidity synchronization service")]
struct Args {
    /// Path to engine configuration file
    #[arg(short, long, default_value = "engine.toml")]
    config: String,

    /// JSON state file seeding deployments and curve parameters
    #[arg(short, long)]
    state: Option<String>,

    /// Override the sync interval in seconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Override the deviation-check interval in seconds
    #[arg(long)]
    deviation_interval: Option<u64>,

    /// Write an example configuration file to this path and exit
    #[arg(long)]
    example_config: Option<String>,

    /// Dry run mode - compute but don't submit transactions
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Seed state loaded into the in-memory store at startup
#[derive(Debug, Deserialize)]
struct StateFile {
    #[serde(default)]
    curve_params: Vec<CurveParams>,
    #[serde(default)]
    deployments: Vec<Deployment>,
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .init();

    if let Some(path) = args.example_config {
        create_example_config(&path)?;
        log::info!("Wrote example configuration to {}", path);
        return Ok(());
    }

    log::info!("Starting Omnilaunch synchronization engine");

    if args.dry_run {
        log::warn!("Running in DRY RUN mode - no transactions will be submitted");
    }

    // Load configuration
    let mut config = EngineConfig::load(&args.config)?;
    if let Some(interval) = args.interval {
        config.sync_interval_secs = interval;
    }
    if let Some(interval) = args.deviation_interval {
        config.deviation_interval_secs = interval;
    }
    config.validate()?;

    log::info!(
        "Loaded configuration for {} chains (sync every {}s, deviation every {}s)",
        config.enabled_chains().len(),
        config.sync_interval_secs,
        config.deviation_interval_secs
    );

    // Build the store and seed it
    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &args.state {
        let content = std::fs::read_to_string(path)?;
        let state: StateFile = serde_json::from_str(&content)
            .map_err(|e| ServiceError::Serialization(format!("Failed to parse {}: {}", path, e)))?;

        log::info!(
            "Seeding {} curve parameter sets and {} deployments from {}",
            state.curve_params.len(),
            state.deployments.len(),
            path
        );
        for params in state.curve_params {
            store.put_curve_params(params).await?;
        }
        for deployment in state.deployments {
            store.upsert_deployment(deployment).await?;
        }
    }

    // Resolve chain clients once at startup
    let mut registry = ChainRegistry::new();
    for chain in config.enabled_chains() {
        log::info!("Registering chain {} at {}", chain.chain_id, chain.rpc_url);
        registry.register(Arc::new(JsonRpcChainClient::new(
            &chain.chain_id,
            &chain.rpc_url,
        )));
    }
    let registry = Arc::new(registry);

    let pool_creator = Arc::new(RpcDexPoolCreator::new(registry.clone(), &config));

    let sync_interval = config.sync_interval_secs;
    let deviation_interval = config.deviation_interval_secs;

    let engine = Arc::new(SyncEngine::new(
        store,
        registry,
        pool_creator,
        config,
        args.dry_run,
    ));

    log::info!("Engine initialized successfully");

    // Price-deviation diagnostic runs on its own cadence
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut interval_timer = time::interval(Duration::from_secs(deviation_interval));
            loop {
                interval_timer.tick().await;
                match engine.run_deviation_tick().await {
                    Ok(flagged) if flagged > 0 => {
                        log::warn!("Deviation check flagged {} tokens out of sync", flagged);
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Deviation tick failed: {}", e),
                }
            }
        });
    }

    // Main monitoring loop
    let mut interval_timer = time::interval(Duration::from_secs(sync_interval));
    let mut iteration = 0u64;

    loop {
        interval_timer.tick().await;
        iteration += 1;

        log::debug!("Starting sync iteration {}", iteration);

        match engine.run_sync_tick().await {
            Ok(processed) => {
                if processed > 0 {
                    log::debug!("Iteration {}: processed {} tokens", iteration, processed);
                }
            }
            Err(e) => {
                log::error!("Error in sync iteration {}: {}", iteration, e);
                // Continue running even if individual iterations fail
            }
        }

        // Basic health metrics every 100 iterations
        if iteration % 100 == 0 {
            log::info!("Engine health check - iteration {}", iteration);
            if let Err(e) = engine.health_check().await {
                log::warn!("Health check warning: {}", e);
            }
        }
    }
}
