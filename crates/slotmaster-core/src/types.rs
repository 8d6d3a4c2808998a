//! Domain types shared between the coordinator and cluster clients.
//!
//! These mirror the records a YARN-style resource manager exchanges with
//! an application master: container requests, allocated containers,
//! completion statuses and launch contexts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hostname as reported by the cluster inventory.
pub type Host = String;

// ── Roles ─────────────────────────────────────────────────────────

/// The two kinds of process this coordinator places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Master,
    Worker,
}

impl Role {
    /// Request priority for this role.
    ///
    /// The resource manager does not allow relaxed and strict locality
    /// requests at the same priority, so the two roles must differ.
    pub fn priority(self) -> Priority {
        match self {
            Role::Master => Priority(0),
            Role::Worker => Priority(1),
        }
    }

    /// Argument passed to the setup script to select the process to run.
    pub fn command_arg(self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_arg())
    }
}

/// Application-scoped request priority. Lower is more important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub u32);

// ── Requests ──────────────────────────────────────────────────────

/// Memory and CPU asked for a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceShape {
    pub memory_mb: u64,
    pub vcores: u32,
}

/// Where a container may land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlacementConstraint {
    /// Candidate hosts. Empty means any host.
    pub hosts: Vec<Host>,
    /// Whether the resource manager may fall back to unlisted hosts.
    pub relax_locality: bool,
}

impl PlacementConstraint {
    /// Whether a container on `host` satisfies this constraint.
    pub fn accepts(&self, host: &str) -> bool {
        self.relax_locality || self.hosts.is_empty() || self.hosts.iter().any(|h| h == host)
    }
}

/// A single ask submitted to the resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequest {
    pub role: Role,
    pub shape: ResourceShape,
    pub placement: PlacementConstraint,
    /// Rack candidates. Always empty: rack awareness is not used.
    pub racks: Vec<String>,
    pub priority: Priority,
}

// ── Containers ────────────────────────────────────────────────────

/// Identity of an allocated container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        ContainerId(s.to_string())
    }
}

/// An execution slot granted by the resource manager.
///
/// Consumed exactly once: either launched or released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    /// Host of the node manager owning this container.
    pub host: Host,
    /// Node manager HTTP address, in the form `host:port`.
    pub node_http_address: String,
    pub shape: ResourceShape,
    pub priority: Priority,
}

impl Container {
    /// The host portion of the node HTTP address.
    pub fn net_address(&self) -> &str {
        self.node_http_address
            .split(':')
            .next()
            .unwrap_or(&self.node_http_address)
    }
}

/// Container exit status code as reported by the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitStatus(pub i32);

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus(0);
    pub const INVALID: ExitStatus = ExitStatus(-1000);
    /// Container was released or killed by the framework.
    pub const ABORTED: ExitStatus = ExitStatus(-100);

    pub fn is_aborted(self) -> bool {
        self == Self::ABORTED
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion record for a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub id: ContainerId,
    pub exit_status: ExitStatus,
    pub diagnostics: String,
}

/// Report about a node whose state changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub host: Host,
    pub healthy: bool,
}

/// Terminal status reported when unregistering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Succeeded,
    Failed,
    Killed,
}

// ── Launch ────────────────────────────────────────────────────────

/// A file the node manager copies into the container before launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalResource {
    /// Location on the shared file system.
    pub uri: String,
}

/// Everything the node manager needs to start a process in a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LaunchContext {
    pub commands: Vec<String>,
    pub local_resources: BTreeMap<String, LocalResource>,
    pub environment: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(addr: &str) -> Container {
        Container {
            id: ContainerId::from("c-1"),
            host: "h1".to_string(),
            node_http_address: addr.to_string(),
            shape: ResourceShape { memory_mb: 1024, vcores: 1 },
            priority: Priority(1),
        }
    }

    #[test]
    fn roles_have_distinct_priorities() {
        assert_ne!(Role::Master.priority(), Role::Worker.priority());
        assert!(Role::Master.priority() < Role::Worker.priority());
    }

    #[test]
    fn net_address_strips_port() {
        assert_eq!(container("10.0.0.5:8042").net_address(), "10.0.0.5");
        assert_eq!(container("h1").net_address(), "h1");
    }

    #[test]
    fn strict_constraint_only_accepts_listed_hosts() {
        let c = PlacementConstraint {
            hosts: vec!["h1".into(), "h2".into()],
            relax_locality: false,
        };
        assert!(c.accepts("h2"));
        assert!(!c.accepts("h3"));
    }

    #[test]
    fn relaxed_or_empty_constraint_accepts_anything() {
        let relaxed = PlacementConstraint {
            hosts: vec!["h1".into()],
            relax_locality: true,
        };
        assert!(relaxed.accepts("h9"));
        assert!(PlacementConstraint::default().accepts("h9"));
    }

    #[test]
    fn aborted_status_is_recognized() {
        assert!(ExitStatus::ABORTED.is_aborted());
        assert!(!ExitStatus(1).is_aborted());
        assert!(!ExitStatus::SUCCESS.is_aborted());
    }
}
