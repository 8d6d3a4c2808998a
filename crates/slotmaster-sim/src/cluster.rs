//! The simulated cluster and its client handles.
//!
//! One [`SimCluster`] owns the shared state. The resource manager, node
//! manager and inventory handles it hands out are thin views over it, so
//! a test can drive the coordinator through the handles and inspect what
//! happened through the cluster.
//!
//! Events are delivered from a tokio task on every heartbeat, never
//! from inside a client call. The coordinator calls back into the clients
//! while holding its own locks.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use slotmaster_coordinator::{AllocationHandler, ClusterInventory, NodeManager, ResourceManager};
use slotmaster_core::{
    Container, ContainerId, ContainerRequest, ContainerStatus, ExitStatus, FinalStatus, Host,
    LaunchContext, NodeReport, PlacementConstraint, Role,
};

use crate::error::SimError;

/// Default delay between two event deliveries.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(500);

/// Default number of containers each simulated node can hold.
pub const DEFAULT_SLOTS_PER_HOST: u32 = 4;

const NODE_HTTP_PORT: u16 = 8042;

/// How the resource manager picks among hosts that fit a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// The fitting host with the fewest containers; ties go to the first.
    #[default]
    LeastLoaded,
    /// The first fitting host, in inventory order.
    FirstFit,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Hosts in the cluster, in inventory order.
    pub hosts: Vec<Host>,
    /// Containers a host can hold at once, masters included.
    pub slots_per_host: u32,
    pub heartbeat: Duration,
    pub policy: PlacementPolicy,
    /// Unrequested containers handed out along with the first master grant.
    pub surplus_master: u32,
    /// Unrequested containers handed out along with the first worker grant.
    pub surplus_workers: u32,
}

impl SimConfig {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Host>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            slots_per_host: DEFAULT_SLOTS_PER_HOST,
            heartbeat: DEFAULT_HEARTBEAT,
            policy: PlacementPolicy::default(),
            surplus_master: 0,
            surplus_workers: 0,
        }
    }

    pub fn with_slots_per_host(mut self, slots: u32) -> Self {
        self.slots_per_host = slots;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_policy(mut self, policy: PlacementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_surplus_master(mut self, extra: u32) -> Self {
        self.surplus_master = extra;
        self
    }

    pub fn with_surplus_workers(mut self, extra: u32) -> Self {
        self.surplus_workers = extra;
        self
    }
}

/// What the application master reported when it registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub host: String,
    pub port: u16,
    pub tracking_url: String,
}

#[derive(Default)]
struct State {
    handler: Option<Arc<dyn AllocationHandler>>,
    inventory_started: bool,

    pending: VecDeque<ContainerRequest>,
    requests: Vec<ContainerRequest>,
    slots_used: HashMap<Host, u32>,
    live: HashMap<ContainerId, Container>,
    launched: HashSet<ContainerId>,
    launches: Vec<(Container, LaunchContext)>,
    released: Vec<ContainerId>,
    next_id: u64,

    completed: Vec<ContainerStatus>,
    node_reports: Vec<NodeReport>,
    shutdown_pending: bool,

    registration: Option<Registration>,
    final_status: Option<(FinalStatus, String)>,
    refuse_registration: bool,
    refuse_unregistration: bool,
    failing_hosts: HashSet<Host>,

    surplus_master: u32,
    surplus_workers: u32,
}

struct Delivery {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Shared {
    config: SimConfig,
    state: Mutex<State>,
    delivery: Mutex<Option<Delivery>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delivery(&self) -> MutexGuard<'_, Option<Delivery>> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One delivery cycle: allocate what fits, then hand everything queued
    /// to the handler with no lock held.
    fn heartbeat(&self) {
        let (handler, reports, completed, allocated, shutdown) = {
            let mut state = self.lock();
            let Some(handler) = state.handler.clone() else {
                return;
            };
            let reports = std::mem::take(&mut state.node_reports);
            let completed = std::mem::take(&mut state.completed);
            let allocated = self.allocate(&mut state);
            let shutdown = std::mem::take(&mut state.shutdown_pending);
            (handler, reports, completed, allocated, shutdown)
        };

        if !reports.is_empty() {
            handler.on_nodes_updated(reports);
        }
        if !completed.is_empty() {
            debug!(count = completed.len(), "delivering completed containers");
            handler.on_containers_completed(completed);
        }
        if !allocated.is_empty() {
            debug!(count = allocated.len(), "delivering allocated containers");
            handler.on_containers_allocated(allocated);
        }
        if shutdown {
            handler.on_shutdown_request();
        }
        trace!(progress = handler.progress(), "heartbeat");
    }

    /// Grant every pending request that fits. The rest stay queued.
    fn allocate(&self, state: &mut State) -> Vec<Container> {
        let mut granted = Vec::new();
        let mut waiting = VecDeque::new();

        while let Some(request) = state.pending.pop_front() {
            let Some(host) = self.pick_host(state, &request.placement) else {
                waiting.push_back(request);
                continue;
            };
            granted.push(self.grant(state, host, &request));

            let surplus = match request.role {
                Role::Master => &mut state.surplus_master,
                Role::Worker => &mut state.surplus_workers,
            };
            let mut extra = std::mem::take(surplus);
            while extra > 0 {
                let Some(host) = self.pick_host(state, &request.placement) else {
                    break;
                };
                info!(%host, role = %request.role, "granting unrequested container");
                granted.push(self.grant(state, host, &request));
                extra -= 1;
            }
        }

        state.pending = waiting;
        granted
    }

    /// Listed hosts with a free slot first; unlisted ones only when the
    /// constraint allows it.
    fn pick_host(&self, state: &State, placement: &PlacementConstraint) -> Option<Host> {
        let free = |host: &&Host| {
            state.slots_used.get(*host).copied().unwrap_or(0) < self.config.slots_per_host
        };

        let listed: Vec<&Host> = self
            .config
            .hosts
            .iter()
            .filter(|h| placement.hosts.contains(*h))
            .filter(free)
            .collect();
        let candidates: Vec<&Host> = if listed.is_empty() {
            self.config
                .hosts
                .iter()
                .filter(|h| placement.accepts(h))
                .filter(free)
                .collect()
        } else {
            listed
        };

        let chosen = match self.config.policy {
            PlacementPolicy::FirstFit => candidates.first().copied(),
            PlacementPolicy::LeastLoaded => candidates
                .iter()
                .copied()
                .min_by_key(|h| state.slots_used.get(*h).copied().unwrap_or(0)),
        };
        chosen.cloned()
    }

    fn grant(&self, state: &mut State, host: Host, request: &ContainerRequest) -> Container {
        state.next_id += 1;
        let container = Container {
            id: ContainerId(format!("container_sim_{:06}", state.next_id)),
            node_http_address: format!("{host}:{NODE_HTTP_PORT}"),
            host: host.clone(),
            shape: request.shape,
            priority: request.priority,
        };
        *state.slots_used.entry(host).or_default() += 1;
        state.live.insert(container.id.clone(), container.clone());
        container
    }

    /// Free the container's slot and queue its completion.
    fn complete(&self, state: &mut State, id: &ContainerId, status: ExitStatus, diagnostics: &str) -> bool {
        let Some(container) = state.live.remove(id) else {
            return false;
        };
        if let Some(used) = state.slots_used.get_mut(&container.host) {
            *used = used.saturating_sub(1);
        }
        state.launched.remove(id);
        state.completed.push(ContainerStatus {
            id: id.clone(),
            exit_status: status,
            diagnostics: diagnostics.to_string(),
        });
        true
    }
}

async fn run_delivery(shared: Weak<Shared>, heartbeat: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(heartbeat);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.heartbeat();
            }
            _ = stop.changed() => break,
        }
    }
    debug!("delivery task exiting");
}

/// An in-process cluster of fixed hosts.
#[derive(Clone)]
pub struct SimCluster {
    shared: Arc<Shared>,
}

impl SimCluster {
    pub fn new(config: SimConfig) -> Self {
        let state = State {
            surplus_master: config.surplus_master,
            surplus_workers: config.surplus_workers,
            ..Default::default()
        };
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                delivery: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.shared.config
    }

    pub fn resource_manager(&self) -> Arc<SimResourceManager> {
        Arc::new(SimResourceManager {
            shared: self.shared.clone(),
        })
    }

    pub fn node_manager(&self) -> Arc<SimNodeManager> {
        Arc::new(SimNodeManager {
            shared: self.shared.clone(),
        })
    }

    pub fn inventory(&self) -> Arc<SimInventory> {
        Arc::new(SimInventory {
            shared: self.shared.clone(),
        })
    }

    /// Ask the application master to shut down on the next heartbeat.
    pub fn request_shutdown(&self) {
        info!("resource manager requesting shutdown");
        self.shared.lock().shutdown_pending = true;
    }

    /// Make every launch on `host` fail.
    pub fn fail_launches_on(&self, host: impl Into<Host>) {
        self.shared.lock().failing_hosts.insert(host.into());
    }

    pub fn refuse_registration(&self) {
        self.shared.lock().refuse_registration = true;
    }

    pub fn refuse_unregistration(&self) {
        self.shared.lock().refuse_unregistration = true;
    }

    /// Finish a running container with `status`, as if its process exited.
    pub fn finish_container(&self, id: &ContainerId, status: ExitStatus) -> Result<(), SimError> {
        let mut state = self.shared.lock();
        if !state.launched.contains(id) {
            return Err(SimError::UnknownContainer(id.clone()));
        }
        self.shared.complete(&mut state, id, status, "container exited");
        Ok(())
    }

    /// Every request submitted, in order.
    pub fn requests(&self) -> Vec<ContainerRequest> {
        self.shared.lock().requests.clone()
    }

    /// Requests not yet granted.
    pub fn pending_requests(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn released(&self) -> Vec<ContainerId> {
        self.shared.lock().released.clone()
    }

    /// Every successful launch, in order.
    pub fn launches(&self) -> Vec<(Container, LaunchContext)> {
        self.shared.lock().launches.clone()
    }

    /// Containers in use on `host`, launched or not.
    pub fn slots_used(&self, host: &str) -> u32 {
        self.shared.lock().slots_used.get(host).copied().unwrap_or(0)
    }

    pub fn registration(&self) -> Option<Registration> {
        self.shared.lock().registration.clone()
    }

    pub fn final_status(&self) -> Option<FinalStatus> {
        self.shared.lock().final_status.as_ref().map(|(status, _)| *status)
    }

    /// Diagnostics sent along with the final status.
    pub fn final_diagnostics(&self) -> Option<String> {
        self.shared
            .lock()
            .final_status
            .as_ref()
            .map(|(_, diagnostics)| diagnostics.clone())
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .delivery()
            .as_ref()
            .is_some_and(|d| !d.task.is_finished())
    }
}

/// Resource manager view of a [`SimCluster`].
pub struct SimResourceManager {
    shared: Arc<Shared>,
}

impl ResourceManager for SimResourceManager {
    fn start(&self, handler: Arc<dyn AllocationHandler>) -> anyhow::Result<()> {
        let mut delivery = self.shared.delivery();
        if delivery.is_some() {
            return Err(SimError::AlreadyStarted.into());
        }
        let runtime = Handle::try_current().map_err(|_| SimError::NoRuntime)?;

        {
            let mut state = self.shared.lock();
            state.handler = Some(handler);
            state.node_reports = self
                .shared
                .config
                .hosts
                .iter()
                .map(|host| NodeReport {
                    host: host.clone(),
                    healthy: true,
                })
                .collect();
        }

        let (stop, rx) = watch::channel(false);
        let weak = Arc::downgrade(&self.shared);
        let heartbeat = self.shared.config.heartbeat;
        let task = runtime.spawn(run_delivery(weak, heartbeat, rx));

        *delivery = Some(Delivery { stop, task });
        info!(
            hosts = self.shared.config.hosts.len(),
            slots_per_host = self.shared.config.slots_per_host,
            heartbeat = ?heartbeat,
            "simulated resource manager started"
        );
        Ok(())
    }

    fn register_application_master(
        &self,
        host: &str,
        port: u16,
        tracking_url: &str,
    ) -> anyhow::Result<()> {
        let mut state = self.shared.lock();
        if state.handler.is_none() {
            return Err(SimError::NotStarted.into());
        }
        if state.refuse_registration {
            return Err(SimError::RegistrationRefused.into());
        }
        state.registration = Some(Registration {
            host: host.to_string(),
            port,
            tracking_url: tracking_url.to_string(),
        });
        Ok(())
    }

    fn add_container_request(&self, request: ContainerRequest) {
        let mut state = self.shared.lock();
        state.requests.push(request.clone());
        state.pending.push_back(request);
    }

    fn release_assigned_container(&self, id: &ContainerId) {
        let mut state = self.shared.lock();
        if self
            .shared
            .complete(&mut state, id, ExitStatus::ABORTED, "Container released by application")
        {
            state.released.push(id.clone());
        } else {
            warn!(container = %id, "release of unknown container ignored");
        }
    }

    fn unregister_application_master(
        &self,
        status: FinalStatus,
        diagnostics: &str,
        _tracking_url: &str,
    ) -> anyhow::Result<()> {
        let mut state = self.shared.lock();
        if state.refuse_unregistration {
            return Err(SimError::UnregistrationRefused.into());
        }
        state.final_status = Some((status, diagnostics.to_string()));
        Ok(())
    }

    fn stop(&self) {
        self.shared.lock().handler = None;

        let Some(delivery) = self.shared.delivery().take() else {
            return;
        };
        // Detached: the task exits on its next poll.
        let _ = delivery.stop.send(true);
        drop(delivery.task);
        info!("simulated resource manager stopped");
    }
}

/// Node manager view of a [`SimCluster`].
pub struct SimNodeManager {
    shared: Arc<Shared>,
}

impl NodeManager for SimNodeManager {
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn start_container(&self, container: &Container, ctx: &LaunchContext) -> anyhow::Result<()> {
        let mut state = self.shared.lock();
        if !state.live.contains_key(&container.id) {
            return Err(SimError::UnknownContainer(container.id.clone()).into());
        }
        if state.launched.contains(&container.id) {
            return Err(SimError::AlreadyLaunched(container.id.clone()).into());
        }
        if state.failing_hosts.contains(&container.host) {
            self.shared
                .complete(&mut state, &container.id, ExitStatus::INVALID, "launch failed");
            return Err(SimError::LaunchRefused(container.host.clone()).into());
        }

        debug!(container = %container.id, host = %container.host, command = ?ctx.commands, "container launched");
        state.launched.insert(container.id.clone());
        state.launches.push((container.clone(), ctx.clone()));
        Ok(())
    }

    fn stop(&self) {}
}

/// Inventory view of a [`SimCluster`].
pub struct SimInventory {
    shared: Arc<Shared>,
}

impl ClusterInventory for SimInventory {
    fn start(&self) -> anyhow::Result<()> {
        self.shared.lock().inventory_started = true;
        Ok(())
    }

    fn node_hosts(&self) -> anyhow::Result<BTreeSet<Host>> {
        if !self.shared.lock().inventory_started {
            return Err(SimError::NotStarted.into());
        }
        Ok(self.shared.config.hosts.iter().cloned().collect())
    }

    fn stop(&self) {
        self.shared.lock().inventory_started = false;
    }
}
