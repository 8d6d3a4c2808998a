//! Application lifecycle phases.

use std::fmt;

/// Where the coordinator is in its lifecycle.
///
/// Phases only move forward; see [`Phase::precedes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    /// Clients started and registered with the resource manager.
    Started,
    MasterRequested,
    MasterLaunched,
    /// Worker round `round` (1-based) is outstanding.
    WorkersRequesting { round: u32 },
    WorkersSatisfied,
    /// Round limit reached below target; running with fewer workers.
    WorkersExhausted,
    Running,
    ShutdownRequested,
    Stopped,
}

impl Phase {
    fn rank(self) -> (u8, u32) {
        match self {
            Phase::Created => (0, 0),
            Phase::Started => (1, 0),
            Phase::MasterRequested => (2, 0),
            Phase::MasterLaunched => (3, 0),
            Phase::WorkersRequesting { round } => (4, round),
            Phase::WorkersSatisfied | Phase::WorkersExhausted => (5, 0),
            Phase::Running => (6, 0),
            Phase::ShutdownRequested => (7, 0),
            Phase::Stopped => (8, 0),
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn precedes(self, next: Phase) -> bool {
        self.rank() < next.rank()
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Stopped
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Created => f.write_str("created"),
            Phase::Started => f.write_str("started"),
            Phase::MasterRequested => f.write_str("master_requested"),
            Phase::MasterLaunched => f.write_str("master_launched"),
            Phase::WorkersRequesting { round } => write!(f, "workers_requesting(round {round})"),
            Phase::WorkersSatisfied => f.write_str("workers_satisfied"),
            Phase::WorkersExhausted => f.write_str("workers_exhausted"),
            Phase::Running => f.write_str("running"),
            Phase::ShutdownRequested => f.write_str("shutdown_requested"),
            Phase::Stopped => f.write_str("stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_move_forward() {
        assert!(Phase::Created.precedes(Phase::Started));
        assert!(Phase::MasterLaunched.precedes(Phase::WorkersRequesting { round: 1 }));
        assert!(Phase::WorkersRequesting { round: 1 }.precedes(Phase::WorkersRequesting { round: 2 }));
        assert!(Phase::Running.precedes(Phase::ShutdownRequested));
    }

    #[test]
    fn no_backward_transitions() {
        assert!(!Phase::ShutdownRequested.precedes(Phase::Running));
        assert!(!Phase::Stopped.precedes(Phase::Stopped));
        assert!(!Phase::WorkersSatisfied.precedes(Phase::WorkersExhausted));
    }

    #[test]
    fn only_stopped_is_terminal() {
        assert!(Phase::Stopped.is_terminal());
        assert!(!Phase::ShutdownRequested.is_terminal());
    }

    #[test]
    fn display_includes_round() {
        assert_eq!(
            Phase::WorkersRequesting { round: 3 }.to_string(),
            "workers_requesting(round 3)"
        );
    }
}
