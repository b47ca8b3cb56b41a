//! # Solver CLI
use crate::{config::SolverConfig, constants::SOLVER_PRIVATE_KEY_ENV, spawn::try_spawn_with_args};
use clap::Parser;
use std::{net::IpAddr, path::PathBuf};

/// The solver fills fast transfer orders, settles them in batches and relays the Hyperlane
/// messages that settle them.
#[derive(Debug, Parser)]
#[command(author, about = "Solver", long_about = None)]
pub struct Args {
    /// The configuration file.
    ///
    /// If missing, a default one will be used and stored in the working directory under
    /// `solver.yaml`.
    #[arg(long, value_name = "CONFIG", env = "SOLVER_CONFIG", default_value = "solver.yaml")]
    pub config: PathBuf,
    /// The database URL. An in-memory store is used if neither this nor the config sets one.
    #[arg(long = "database-url", value_name = "URL", env = "SOLVER_DB_URL")]
    pub database_url: Option<String>,
    /// The address to serve metrics on.
    #[arg(long = "metrics.addr", value_name = "ADDR")]
    pub metrics_address: Option<IpAddr>,
    /// The port to serve metrics on.
    #[arg(long = "metrics.port", value_name = "PORT")]
    pub metrics_port: Option<u16>,
    /// The number of fill workers.
    #[arg(long, value_name = "NUM")]
    pub workers: Option<usize>,
    /// Whether to submit fill transactions.
    #[arg(long = "enable-fills", value_name = "BOOL", env = "SOLVER_ENABLE_FILLS")]
    pub enable_fills: Option<bool>,
    /// Whether to initiate timeouts for expired orders.
    #[arg(long = "enable-refunds", value_name = "BOOL", env = "SOLVER_ENABLE_REFUNDS")]
    pub enable_refunds: Option<bool>,
    /// The private key to sign transactions with.
    #[arg(
        long = "private-key",
        value_name = "SECRET_KEY",
        env = SOLVER_PRIVATE_KEY_ENV,
        hide_env_values = true
    )]
    pub private_key: Option<String>,
}

impl Args {
    /// Run the solver until it is interrupted.
    pub async fn run(self) -> eyre::Result<()> {
        let config_path = self.config.clone();
        let handle = try_spawn_with_args(self, &config_path).await?;

        tokio::signal::ctrl_c().await?;
        handle.shutdown().await;

        Ok(())
    }

    /// Merges [`Args`] values into an existing [`SolverConfig`] instance.
    pub fn merge_solver_config(self, config: SolverConfig) -> SolverConfig {
        config
            .with_database_url(self.database_url)
            .with_metrics_address(self.metrics_address)
            .with_metrics_port(self.metrics_port)
            .with_workers(self.workers)
            .with_fills(self.enable_fills)
            .with_refunds(self.enable_refunds)
            .with_private_key(self.private_key)
    }
}
