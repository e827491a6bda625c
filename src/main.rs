use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use storage_circuit::breaker::BreakerRegistry;
use storage_circuit::checker::FleetChecker;
use storage_circuit::config::Config;
use storage_circuit::health::{Health, HealthAggregator, HealthReport};
use storage_circuit::probe::ProcessProbe;
use storage_circuit::store::{MemoryStore, RedisStore, SharedStateStore};
use tokio::sync::broadcast;

/// Storage circuit breaker - storage accessibility checks and failure reports
#[derive(Parser, Debug)]
#[command(name = "storage-circuit")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check every configured storage from this host and record the results
    Check {
        /// Keep checking every check_interval until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Print failure counts per storage as JSON
    Health {
        /// Only storages with at least one failing host
        #[arg(long)]
        failing: bool,
    },
    /// Delete every recorded failure on every host
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    storage_circuit::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging subsystem: {}", e))?;
    config.validate().map_err(anyhow::Error::msg)?;

    tracing::info!(
        config_file = %args.config.display(),
        storages = config.storages.len(),
        shared_store = if config.redis.redis_url.is_some() { "redis" } else { "memory" },
        "Configuration loaded successfully"
    );

    let store = connect_store(&config).await?;
    let probe = Arc::new(ProcessProbe::new(config.probe.clone()));

    match args.command {
        Command::Check { watch: false } => {
            let results = FleetChecker::new(&config, store, probe).check_all().await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Check { watch: true } => {
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            let checker = tokio::spawn(FleetChecker::new(&config, store, probe).run(shutdown_rx));

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
            checker.await.context("Storage checker task failed")?;
        }
        Command::Health { failing } => {
            let aggregator = HealthAggregator::new(&config, store);
            let health = if failing {
                aggregator.for_failing_storages().await?
            } else {
                aggregator.for_all_storages().await?
            };
            let reports: Vec<HealthReport> = health.iter().map(Health::report).collect();
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Command::Reset => {
            BreakerRegistry::new(&config, store, probe).reset_all().await?;
            println!("All storage failure records reset");
        }
    }

    Ok(())
}

async fn connect_store(config: &Config) -> Result<Arc<dyn SharedStateStore>> {
    if config.redis.redis_url.is_none() {
        tracing::warn!("No redis_url configured, failure state is local to this process");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = RedisStore::new(&config.redis)
        .await
        .context("Failed to connect to shared-state store")?;
    if !store.health_check().await {
        anyhow::bail!("Shared-state store is not responding to PING");
    }
    Ok(Arc::new(store))
}
