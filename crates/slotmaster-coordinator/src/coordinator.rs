//! Coordinator — the bring-up control sequence.
//!
//! The `Coordinator` is driven by one control task:
//! 1. `start()` starts the clients and registers with the resource manager
//! 2. `request_containers()` requests the master, waits for its launch,
//!    requests workers in rounds, then waits for a shutdown request
//! 3. `stop()` unregisters with a final status and stops the clients
//!
//! Allocation events arrive on the resource manager's delivery thread and
//! are handled by the shared [`Router`].

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use slotmaster_core::{CoordinatorConfig, FinalStatus, Host};

use crate::client::{AllocationHandler, ClusterInventory, NodeManager, ResourceManager};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::latch::RoundGate;
use crate::launch::LaunchTemplate;
use crate::phase::Phase;
use crate::request::RequestBuilder;
use crate::router::Router;

/// Maximum number of worker request rounds before settling for fewer workers.
pub const MAX_WORKER_REQUEST_ROUNDS: u32 = 20;

/// Port reported at registration. Nothing listens for the resource manager.
const REGISTRATION_PORT: u16 = 0;

/// Outcome of the worker rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRounds {
    pub rounds: u32,
    pub workers: u32,
    pub target: u32,
}

impl WorkerRounds {
    pub fn satisfied(&self) -> bool {
        self.workers >= self.target
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    requests: RequestBuilder,
    rm: Arc<dyn ResourceManager>,
    nm: Arc<dyn NodeManager>,
    inventory: Arc<dyn ClusterInventory>,
    router: Arc<Router>,
    local_host: String,
}

impl Coordinator {
    /// Create a coordinator. Clients are started in [`Coordinator::start`].
    pub fn new(
        config: CoordinatorConfig,
        rm: Arc<dyn ResourceManager>,
        nm: Arc<dyn NodeManager>,
        inventory: Arc<dyn ClusterInventory>,
    ) -> CoordinatorResult<Self> {
        config.validate()?;
        let requests = RequestBuilder::from_config(&config)?;
        let template = LaunchTemplate::from_config(&config)?;
        let router = Arc::new(Router::new(
            rm.clone(),
            nm.clone(),
            template,
            config.worker.count,
            config.worker.max_per_host,
        ));

        Ok(Self {
            config,
            requests,
            rm,
            nm,
            inventory,
            router,
            local_host: local_hostname(),
        })
    }

    /// Override the hostname reported at registration.
    pub fn with_local_host(mut self, host: impl Into<String>) -> Self {
        self.local_host = host.into();
        self
    }

    /// Start the clients and register this application master.
    pub fn start(&self) -> CoordinatorResult<()> {
        self.nm
            .start()
            .map_err(|source| CoordinatorError::ClientStart {
                client: "node manager",
                source,
            })?;

        let handler: Arc<dyn AllocationHandler> = self.router.clone();
        self.rm
            .start(handler)
            .map_err(|source| CoordinatorError::ClientStart {
                client: "resource manager",
                source,
            })?;

        self.inventory
            .start()
            .map_err(|source| CoordinatorError::ClientStart {
                client: "cluster inventory",
                source,
            })?;

        self.rm
            .register_application_master(&self.local_host, REGISTRATION_PORT, "")
            .map_err(CoordinatorError::Registration)?;

        self.router.advance(Phase::Started);
        info!(host = %self.local_host, "application master registered");
        Ok(())
    }

    /// Bring up the master and workers, then wait for a shutdown request.
    ///
    /// Falling short of the worker target after
    /// [`MAX_WORKER_REQUEST_ROUNDS`] is logged, not returned as an error.
    pub async fn request_containers(&self) -> CoordinatorResult<()> {
        self.request_master().await;

        let outcome = self.request_workers().await?;
        if outcome.satisfied() {
            self.router.advance(Phase::WorkersSatisfied);
        } else {
            error!(
                wanted = outcome.target,
                rounds = outcome.rounds,
                workers = outcome.workers,
                "could not reach the worker target, proceeding with fewer workers"
            );
            self.router.advance(Phase::WorkersExhausted);
        }

        info!("master and workers are launched");
        self.router.advance(Phase::Running);
        self.router.done().wait().await;
        self.router.advance(Phase::ShutdownRequested);
        Ok(())
    }

    /// Request the master container and wait until it is launched.
    async fn request_master(&self) {
        let request = self.requests.master();
        info!(
            cpu = request.shape.vcores,
            memory_mb = request.shape.memory_mb,
            host = %self.config.master.host,
            relax_locality = request.placement.relax_locality,
            "requesting master container"
        );
        self.rm.add_container_request(request);
        self.router.advance(Phase::MasterRequested);

        info!("waiting for master container to be allocated");
        // No timeout: a master that never launches stalls the bring-up.
        self.router.master_allocated().wait().await;
        self.router.advance(Phase::MasterLaunched);
    }

    /// Run worker rounds until the target is met or the round limit is hit.
    ///
    /// Each round asks for exactly the shortfall and waits until every
    /// request has been answered by a launch or a release. Containers
    /// rejected because their host is full are made up in the next round.
    pub(crate) async fn request_workers(&self) -> CoordinatorResult<WorkerRounds> {
        let target = self.config.worker.count;
        let mut round = 0;

        while self.router.worker_count() < target && round < MAX_WORKER_REQUEST_ROUNDS {
            let known = self
                .inventory
                .node_hosts()
                .map_err(CoordinatorError::Inventory)?;

            let Some(mut planned) = self.router.plan_round(&known)? else {
                break;
            };

            round += 1;
            let request = self.requests.worker(planned.hosts.clone());
            for i in 0..planned.needed {
                info!(
                    worker = target - planned.needed + i,
                    round,
                    cpu = request.shape.vcores,
                    memory_mb = request.shape.memory_mb,
                    hosts = ?planned.hosts,
                    "requesting worker container"
                );
                self.rm.add_container_request(request.clone());
            }
            self.router.advance(Phase::WorkersRequesting { round });

            info!(outstanding = planned.needed, round, "waiting for worker containers to be allocated");
            // No timeout: unanswered requests stall the round.
            RoundGate::wait_drained(&mut planned.outstanding).await;
        }

        Ok(WorkerRounds {
            rounds: round,
            workers: self.router.worker_count(),
            target,
        })
    }

    /// Unregister with `status` and stop the clients.
    ///
    /// Unregistration failures are logged. Only the first call has any
    /// effect.
    pub fn stop(&self, status: FinalStatus, diagnostics: &str) {
        if self.router.phase().is_terminal() {
            debug!("application master already stopped");
            return;
        }

        if let Err(e) = self
            .rm
            .unregister_application_master(status, diagnostics, "")
        {
            error!(error = %e, "failed to unregister application");
        }
        self.rm.stop();
        self.nm.stop();
        self.inventory.stop();
        self.router.advance(Phase::Stopped);
        info!(?status, "application master stopped");
    }

    /// Stop with the status that matches how the bring-up ended: a failed
    /// bring-up unregisters as failed, with the error as diagnostics.
    pub fn stop_after(&self, outcome: &CoordinatorResult<()>) {
        match outcome {
            Ok(()) => self.stop(FinalStatus::Succeeded, ""),
            Err(e) => self.stop(FinalStatus::Failed, &e.to_string()),
        }
    }

    /// The event handler the resource manager delivers to.
    pub fn handler(&self) -> Arc<dyn AllocationHandler> {
        self.router.clone()
    }

    pub fn phase(&self) -> Phase {
        self.router.phase()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.router.subscribe_phase()
    }

    pub fn master_address(&self) -> Option<String> {
        self.router.master_address().map(str::to_string)
    }

    pub fn worker_count(&self) -> u32 {
        self.router.worker_count()
    }

    /// Hosts running workers, with per-host counts, sorted by host.
    pub fn worker_hosts(&self) -> Vec<(Host, u32)> {
        self.router.worker_hosts()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
