//! Cluster client seams.
//!
//! The coordinator talks to three external services: the resource
//! manager (allocation, release, registration), the node managers
//! (container launch) and the cluster inventory (known hosts). The
//! resource manager calls back into an [`AllocationHandler`] from its own
//! delivery thread, which also owns heartbeating.

use std::collections::BTreeSet;
use std::sync::Arc;

use slotmaster_core::{
    Container, ContainerId, ContainerRequest, ContainerStatus, FinalStatus, Host, LaunchContext,
    NodeReport,
};

/// Events delivered by the resource manager.
///
/// Invoked serially from the resource manager's delivery thread.
pub trait AllocationHandler: Send + Sync {
    fn on_containers_allocated(&self, containers: Vec<Container>);
    fn on_containers_completed(&self, statuses: Vec<ContainerStatus>);
    fn on_nodes_updated(&self, reports: Vec<NodeReport>);
    fn on_shutdown_request(&self);
    fn on_error(&self, error: anyhow::Error);
    /// Fraction of the application's work completed, reported on heartbeat.
    fn progress(&self) -> f32;
}

/// Asynchronous resource manager client.
pub trait ResourceManager: Send + Sync {
    /// Start the client. Events are delivered to `handler` until [`stop`](Self::stop).
    fn start(&self, handler: Arc<dyn AllocationHandler>) -> anyhow::Result<()>;

    fn register_application_master(
        &self,
        host: &str,
        port: u16,
        tracking_url: &str,
    ) -> anyhow::Result<()>;

    fn add_container_request(&self, request: ContainerRequest);

    fn release_assigned_container(&self, id: &ContainerId);

    fn unregister_application_master(
        &self,
        status: FinalStatus,
        diagnostics: &str,
        tracking_url: &str,
    ) -> anyhow::Result<()>;

    fn stop(&self);
}

/// Node manager client used to launch processes in allocated containers.
pub trait NodeManager: Send + Sync {
    fn start(&self) -> anyhow::Result<()>;

    fn start_container(&self, container: &Container, ctx: &LaunchContext) -> anyhow::Result<()>;

    fn stop(&self);
}

/// Read access to the cluster's node inventory.
pub trait ClusterInventory: Send + Sync {
    fn start(&self) -> anyhow::Result<()>;

    /// Hostnames of all running nodes.
    fn node_hosts(&self) -> anyhow::Result<BTreeSet<Host>>;

    fn stop(&self);
}
