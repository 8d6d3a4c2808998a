//! slotmasterd — the slotmaster application master daemon.
//!
//! Runs the coordinator against an in-process simulated cluster:
//! - registers with the resource manager
//! - brings up one master and the configured number of workers
//! - waits for a shutdown request (Ctrl-C), then unregisters
//!
//! # Usage
//!
//! ```text
//! slotmasterd run --config slotmaster.toml --hosts h1,h2,h3 --num-workers 3
//! slotmasterd config --config slotmaster.toml --num-workers 8
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use slotmaster_coordinator::Coordinator;
use slotmaster_core::{CoordinatorConfig, FinalStatus};
use slotmaster_sim::{PlacementPolicy, SimCluster, SimConfig};

#[derive(Parser)]
#[command(name = "slotmasterd", about = "slotmaster application master")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring up the master and workers on a simulated cluster.
    Run {
        #[command(flatten)]
        overrides: ConfigArgs,

        /// Cluster hosts, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        hosts: Vec<String>,

        /// Containers each simulated host can hold.
        #[arg(long, default_value = "4")]
        slots_per_host: u32,

        /// Resource manager heartbeat in milliseconds.
        #[arg(long, default_value = "500")]
        heartbeat_ms: u64,

        /// Pack containers onto the first fitting host instead of spreading them.
        #[arg(long)]
        first_fit: bool,
    },

    /// Print the effective configuration as TOML.
    Config {
        #[command(flatten)]
        overrides: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// Configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of worker containers.
    #[arg(long)]
    num_workers: Option<u32>,

    /// Host for the master container.
    #[arg(long)]
    master_address: Option<String>,

    /// Shared directory holding the application tarball and setup script.
    #[arg(long)]
    resource_path: Option<String>,
}

impl ConfigArgs {
    fn load(&self) -> anyhow::Result<CoordinatorConfig> {
        let mut config = match &self.config {
            Some(path) => CoordinatorConfig::from_file(path)?,
            None => CoordinatorConfig::default(),
        };

        if let Some(count) = self.num_workers {
            config.worker.count = count;
        }
        if let Some(host) = &self.master_address {
            config.master.host = host.clone();
        }
        if let Some(path) = &self.resource_path {
            config.resources.path = path.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,slotmasterd=debug,slotmaster_coordinator=debug,slotmaster_sim=debug",
                )
            }),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run {
            overrides,
            hosts,
            slots_per_host,
            heartbeat_ms,
            first_fit,
        } => {
            let policy = if first_fit {
                PlacementPolicy::FirstFit
            } else {
                PlacementPolicy::LeastLoaded
            };
            let sim = SimConfig::new(hosts)
                .with_slots_per_host(slots_per_host)
                .with_heartbeat(Duration::from_millis(heartbeat_ms))
                .with_policy(policy);
            run(&overrides, sim).await
        }
        Command::Config { overrides } => show_config(&overrides),
    };

    if let Err(e) = &result {
        error!(error = ?e, "slotmaster daemon failed");
    }
    result
}

fn show_config(overrides: &ConfigArgs) -> anyhow::Result<()> {
    print!("{}", overrides.load()?.to_toml_string()?);
    Ok(())
}

async fn run(overrides: &ConfigArgs, sim: SimConfig) -> anyhow::Result<()> {
    let config = overrides.load()?;
    info!(
        hosts = ?sim.hosts,
        workers = config.worker.count,
        master = %config.master.host,
        "slotmaster daemon starting"
    );

    let cluster = SimCluster::new(sim);
    let coordinator = Coordinator::new(
        config,
        cluster.resource_manager(),
        cluster.node_manager(),
        cluster.inventory(),
    )?;
    coordinator.start()?;

    tokio::select! {
        result = coordinator.request_containers() => {
            coordinator.stop_after(&result);
            result?;
        }
        result = forward_interrupts(cluster.clone()) => {
            coordinator.stop(FinalStatus::Killed, "interrupted before bring-up finished");
            result?;
        }
    }

    info!(
        master = coordinator.master_address().as_deref().unwrap_or("-"),
        workers = coordinator.worker_count(),
        wanted = coordinator.config().worker.count,
        hosts = ?coordinator.worker_hosts(),
        "slotmaster daemon finished"
    );
    Ok(())
}

/// The first Ctrl-C becomes a shutdown request from the resource manager.
/// A second one abandons a bring-up that never reached the running phase.
async fn forward_interrupts(cluster: SimCluster) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("interrupt received, requesting shutdown");
    cluster.request_shutdown();

    tokio::signal::ctrl_c().await?;
    warn!("second interrupt, abandoning bring-up");
    Ok(())
}
