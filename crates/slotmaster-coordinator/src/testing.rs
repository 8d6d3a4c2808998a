//! Recording client doubles for unit tests.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use slotmaster_core::{
    Container, ContainerId, ContainerRequest, CoordinatorConfig, FinalStatus, Host, LaunchContext,
    Priority, ResourceShape,
};

use crate::client::{AllocationHandler, ClusterInventory, NodeManager, ResourceManager};
use crate::launch::LaunchTemplate;

pub fn container(id: &str, host: &str) -> Container {
    Container {
        id: ContainerId::from(id),
        host: host.to_string(),
        node_http_address: format!("{host}:8042"),
        shape: ResourceShape {
            memory_mb: 1024,
            vcores: 1,
        },
        priority: Priority(0),
    }
}

pub fn config() -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.resources.path = "/shared/slotmaster".to_string();
    config
}

pub fn template() -> LaunchTemplate {
    LaunchTemplate::from_config(&config()).unwrap()
}

#[derive(Default)]
pub struct RecordingResourceManager {
    pub handler: Mutex<Option<Arc<dyn AllocationHandler>>>,
    pub registered: Mutex<Option<(String, u16, String)>>,
    pub requests: Mutex<Vec<ContainerRequest>>,
    pub released: Mutex<Vec<String>>,
    pub unregistered: Mutex<Option<FinalStatus>>,
    pub fail_register: bool,
    pub fail_unregister: bool,
    pub stopped: Mutex<bool>,
}

impl RecordingResourceManager {
    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<ContainerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ResourceManager for RecordingResourceManager {
    fn start(&self, handler: Arc<dyn AllocationHandler>) -> anyhow::Result<()> {
        *self.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn register_application_master(
        &self,
        host: &str,
        port: u16,
        tracking_url: &str,
    ) -> anyhow::Result<()> {
        if self.fail_register {
            anyhow::bail!("resource manager unreachable");
        }
        *self.registered.lock().unwrap() = Some((host.to_string(), port, tracking_url.to_string()));
        Ok(())
    }

    fn add_container_request(&self, request: ContainerRequest) {
        self.requests.lock().unwrap().push(request);
    }

    fn release_assigned_container(&self, id: &ContainerId) {
        self.released.lock().unwrap().push(id.0.clone());
    }

    fn unregister_application_master(
        &self,
        status: FinalStatus,
        _diagnostics: &str,
        _tracking_url: &str,
    ) -> anyhow::Result<()> {
        if self.fail_unregister {
            anyhow::bail!("resource manager unreachable");
        }
        *self.unregistered.lock().unwrap() = Some(status);
        Ok(())
    }

    fn stop(&self) {
        *self.stopped.lock().unwrap() = true;
        self.handler.lock().unwrap().take();
    }
}

#[derive(Default)]
pub struct RecordingNodeManager {
    launched: Mutex<Vec<(Container, LaunchContext)>>,
    failing_hosts: Mutex<HashSet<String>>,
}

impl RecordingNodeManager {
    pub fn launched(&self) -> Vec<(Container, LaunchContext)> {
        self.launched.lock().unwrap().clone()
    }

    /// Make launches on `host` fail.
    pub fn fail_on(&self, host: &str) {
        self.failing_hosts.lock().unwrap().insert(host.to_string());
    }
}

impl NodeManager for RecordingNodeManager {
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn start_container(&self, container: &Container, ctx: &LaunchContext) -> anyhow::Result<()> {
        if self.failing_hosts.lock().unwrap().contains(&container.host) {
            anyhow::bail!("node manager on {} refused the launch", container.host);
        }
        self.launched
            .lock()
            .unwrap()
            .push((container.clone(), ctx.clone()));
        Ok(())
    }

    fn stop(&self) {}
}

pub struct StaticInventory(pub BTreeSet<Host>);

impl StaticInventory {
    pub fn new(hosts: &[&str]) -> Self {
        Self(hosts.iter().map(|h| h.to_string()).collect())
    }
}

impl ClusterInventory for StaticInventory {
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn node_hosts(&self) -> anyhow::Result<BTreeSet<Host>> {
        Ok(self.0.clone())
    }

    fn stop(&self) {}
}
