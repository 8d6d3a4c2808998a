//! slotmaster-coordinator — brings up a master/worker application on a
//! resource-managed cluster.
//!
//! The coordinator asks the cluster's resource manager for one master
//! container and a target number of worker containers, launches a process
//! in each through the node managers, and then holds until the resource
//! manager asks it to shut down.
//!
//! # Architecture
//!
//! ```text
//! Coordinator (control task)
//!   ├── RequestBuilder (master / worker container requests)
//!   ├── ClusterInventory (known hosts)
//!   └── Router (shared with the resource manager's delivery thread)
//!       ├── master latch, done latch
//!       ├── Mutex<HostPlacement + RoundGate>
//!       └── LaunchTemplate → NodeManager::start_container
//! ```
//!
//! Workers are requested in rounds sized to the current shortfall. Each
//! round waits until every request has been answered by a launch or a
//! release; at most [`MAX_WORKER_REQUEST_ROUNDS`] rounds are attempted.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod latch;
pub mod launch;
pub mod phase;
pub mod request;
pub mod router;

#[cfg(test)]
mod testing;

pub use client::{AllocationHandler, ClusterInventory, NodeManager, ResourceManager};
pub use coordinator::{Coordinator, MAX_WORKER_REQUEST_ROUNDS, WorkerRounds};
pub use error::{CoordinatorError, CoordinatorResult};
pub use latch::{Latch, RoundGate};
pub use launch::LaunchTemplate;
pub use phase::Phase;
pub use request::RequestBuilder;
pub use router::Router;
