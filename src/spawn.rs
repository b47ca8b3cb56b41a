//! Solver spawn utilities.
use crate::{
    chains::ChainClients,
    cli::Args,
    config::SolverConfig,
    error::SolverError,
    fulfillment::FulfillmentDispatcher,
    hyperlane::{EvmHyperlaneClient, Relayer, RelayerRunner, fetcher::DefaultFetcherFactory},
    metrics,
    settlement::SettlementEngine,
    storage::{SolverStorage, StorageError},
};
use alloy::signers::local::PrivateKeySigner;
use eyre::WrapErr;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::{path::Path, sync::Arc};
use tokio::{sync::watch, task::JoinSet};
use tracing::{error, info, warn};

/// Context returned once the solver is launched.
#[derive(Debug)]
pub struct SolverHandle {
    /// Storage of the solver.
    pub storage: SolverStorage,
    /// Chain clients shared by the services.
    pub clients: ChainClients,
    /// Metrics collector handle.
    pub metrics: PrometheusHandle,
    shutdown: watch::Sender<bool>,
    services: JoinSet<()>,
}

impl SolverHandle {
    /// Signals every service to stop and waits for them to exit.
    pub async fn shutdown(mut self) {
        info!("Shutting down solver");
        let _ = self.shutdown.send(true);
        while let Some(result) = self.services.join_next().await {
            if let Err(err) = result {
                error!(%err, "Service task failed");
            }
        }
    }
}

/// Connects to PostgreSQL and runs migrations, or falls back to in-memory storage.
async fn connect_storage(database_url: Option<&str>) -> Result<SolverStorage, SolverError> {
    let Some(database_url) = database_url else {
        info!("Using in-memory storage.");
        return Ok(SolverStorage::in_memory());
    };

    info!("Using PostgreSQL as storage.");
    let pool = PgPool::connect(database_url).await.map_err(StorageError::from)?;
    sqlx::migrate!().run(&pool).await.map_err(StorageError::from)?;

    Ok(SolverStorage::pg(pool))
}

/// Attempts to spawn the solver using CLI arguments and a configuration file.
pub async fn try_spawn_with_args<P: AsRef<Path>>(
    args: Args,
    config_path: P,
) -> eyre::Result<SolverHandle> {
    let config = if !config_path.as_ref().exists() {
        let config = SolverConfig::default();
        config.save_to_file(&config_path)?;
        args.merge_solver_config(config)
    } else {
        // File exists: load and override with CLI values.
        args.merge_solver_config(SolverConfig::load_from_file(&config_path)?)
    };

    try_spawn(config).await
}

/// Spawns the solver services using the provided [`SolverConfig`].
pub async fn try_spawn(config: SolverConfig) -> eyre::Result<SolverHandle> {
    config.validate()?;
    if config.chains.is_empty() {
        warn!("No chains configured");
    }

    let storage = connect_storage(config.database_url.as_deref())
        .await
        .wrap_err("failed to set up storage")?;

    // construct signer
    let signer = match &config.secrets.solver_private_key {
        Some(key) => {
            let signer = key.parse::<PrivateKeySigner>().wrap_err("invalid solver private key")?;
            info!(address = %signer.address(), "Loaded solver signer");
            Some(signer)
        }
        None => {
            warn!("No solver private key configured, transactions cannot be submitted");
            None
        }
    };

    // setup metrics exporter
    let metrics = metrics::setup_exporter((config.metrics.address, config.metrics.port)).await;

    let config = Arc::new(config);
    let clients = ChainClients::new(config.clone(), signer.clone());
    let relayer = Relayer::new(
        config.clone(),
        Arc::new(EvmHyperlaneClient::new(config.clone(), signer)),
        Arc::new(DefaultFetcherFactory::default()),
    );

    let (shutdown, rx) = watch::channel(false);
    let mut services = JoinSet::new();
    let dispatcher = FulfillmentDispatcher::new(config.clone(), storage.clone(), clients.clone());
    services.spawn(dispatcher.run(rx.clone()));
    let engine = SettlementEngine::new(config.clone(), storage.clone(), clients.clone());
    services.spawn(engine.run(rx.clone()));
    services.spawn(RelayerRunner::new(config.clone(), storage.clone(), relayer).run(rx));
    info!(chains = config.chains.len(), "Started solver services");

    Ok(SolverHandle { storage, clients, metrics, shutdown, services })
}
