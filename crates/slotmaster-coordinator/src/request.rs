//! Container request construction.

use slotmaster_core::{
    ContainerRequest, CoordinatorConfig, Host, PlacementConstraint, ResourceShape, Role,
};

use crate::error::CoordinatorResult;

/// Builds master and worker container requests from fixed shapes.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    master_shape: ResourceShape,
    worker_shape: ResourceShape,
    master_host: Host,
    master_relax_locality: bool,
}

impl RequestBuilder {
    pub fn from_config(config: &CoordinatorConfig) -> CoordinatorResult<Self> {
        Ok(Self {
            master_shape: config.master_shape()?,
            worker_shape: config.worker_shape()?,
            master_host: config.master.host.clone(),
            master_relax_locality: config.master_relax_locality(),
        })
    }

    /// The single master request, pinned to the configured master host.
    ///
    /// Locality is only relaxed when the master host is the bootstrap name,
    /// which lets a single-node setup place it anywhere.
    pub fn master(&self) -> ContainerRequest {
        ContainerRequest {
            role: Role::Master,
            shape: self.master_shape,
            placement: PlacementConstraint {
                hosts: vec![self.master_host.clone()],
                relax_locality: self.master_relax_locality,
            },
            racks: Vec::new(),
            priority: Role::Master.priority(),
        }
    }

    /// A worker request restricted to `hosts`.
    pub fn worker(&self, hosts: Vec<Host>) -> ContainerRequest {
        ContainerRequest {
            role: Role::Worker,
            shape: self.worker_shape,
            placement: PlacementConstraint {
                hosts,
                relax_locality: false,
            },
            racks: Vec::new(),
            priority: Role::Worker.priority(),
        }
    }
}
