//! slotmaster-sim — an in-process cluster for local runs and tests.
//!
//! Implements the coordinator's client seams against a fixed set of
//! hosts, each with a number of container slots:
//!
//! - **`SimResourceManager`** — queues container requests and allocates
//!   them on heartbeat ticks from a tokio delivery task, honoring
//!   strict and relaxed locality
//! - **`SimNodeManager`** — records launches, optionally refusing them on
//!   selected hosts
//! - **`SimInventory`** — lists the configured hosts
//!
//! Released containers come back as aborted completions, as they would
//! from a real resource manager.

pub mod cluster;
pub mod error;

pub use cluster::{
    PlacementPolicy, Registration, SimCluster, SimConfig, SimInventory, SimNodeManager,
    SimResourceManager, DEFAULT_HEARTBEAT, DEFAULT_SLOTS_PER_HOST,
};
pub use error::SimError;
