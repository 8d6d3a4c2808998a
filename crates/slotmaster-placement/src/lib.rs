//! slotmaster-placement — tracks which hosts run workers.
//!
//! The coordinator never places more than a configured number of workers
//! on one host. [`HostPlacement`] is the hostname → worker-count multiset
//! backing that rule. It is not internally synchronized: the coordinator
//! keeps it inside the same lock as the round counter so that counting a
//! host and resolving a request happen together.

pub mod tracker;

pub use tracker::HostPlacement;
