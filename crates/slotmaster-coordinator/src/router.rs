//! Callback routing and launch dispatch.
//!
//! The [`Router`] is the state shared between the control task and the
//! resource manager's delivery thread. It receives allocation events,
//! decides whether each container becomes the master, a worker, or is
//! handed back, and signals the control task through latches.
//!
//! Worker placement and the round countdown sit behind one mutex: a
//! container is counted against its host and against the round in the
//! same critical section.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use slotmaster_core::{Container, ContainerStatus, Host, NodeReport};
use slotmaster_placement::HostPlacement;

use crate::client::{AllocationHandler, NodeManager, ResourceManager};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::latch::{Latch, RoundGate};
use crate::launch::LaunchTemplate;
use crate::phase::Phase;

/// Placement and round state, only touched under [`Router::book`].
#[derive(Debug, Default)]
struct WorkerBook {
    placement: HostPlacement,
    outstanding: RoundGate,
}

/// A worker round ready to be submitted.
#[derive(Debug)]
pub(crate) struct Round {
    pub needed: u32,
    pub hosts: Vec<Host>,
    pub outstanding: watch::Receiver<u32>,
}

pub struct Router {
    rm: Arc<dyn ResourceManager>,
    nm: Arc<dyn NodeManager>,
    template: LaunchTemplate,
    target_workers: u32,
    max_per_host: u32,
    master_allocated: Latch,
    done: Latch,
    master_address: OnceLock<String>,
    book: Mutex<WorkerBook>,
    phase: watch::Sender<Phase>,
}

impl Router {
    pub(crate) fn new(
        rm: Arc<dyn ResourceManager>,
        nm: Arc<dyn NodeManager>,
        template: LaunchTemplate,
        target_workers: u32,
        max_per_host: u32,
    ) -> Self {
        let (phase, _) = watch::channel(Phase::Created);
        Self {
            rm,
            nm,
            template,
            target_workers,
            max_per_host,
            master_allocated: Latch::new(),
            done: Latch::new(),
            master_address: OnceLock::new(),
            book: Mutex::new(WorkerBook::default()),
            phase,
        }
    }

    fn book(&self) -> MutexGuard<'_, WorkerBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── State shared with the control task ──────────────────────────

    pub(crate) fn master_allocated(&self) -> &Latch {
        &self.master_allocated
    }

    pub(crate) fn done(&self) -> &Latch {
        &self.done
    }

    pub fn master_address(&self) -> Option<&str> {
        self.master_address.get().map(String::as_str)
    }

    pub fn worker_count(&self) -> u32 {
        self.book().placement.total()
    }

    pub fn worker_hosts(&self) -> Vec<(Host, u32)> {
        let book = self.book();
        let mut hosts: Vec<_> = book
            .placement
            .hosts()
            .map(|(h, c)| (h.to_string(), c))
            .collect();
        hosts.sort();
        hosts
    }

    pub fn outstanding(&self) -> u32 {
        self.book().outstanding.outstanding()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Move to `next` if it is ahead of the current phase.
    pub(crate) fn advance(&self, next: Phase) {
        let moved = self.phase.send_if_modified(|current| {
            if current.precedes(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(phase = %next, "phase changed");
        }
    }

    /// Size the next worker round against `known_hosts`.
    ///
    /// Returns `None` when the target is already met. Fails without
    /// touching the round counter when the hosts with spare room cannot
    /// absorb the shortfall. Otherwise the counter is reset to the number
    /// of requests the caller must now submit.
    pub(crate) fn plan_round(&self, known_hosts: &BTreeSet<Host>) -> CoordinatorResult<Option<Round>> {
        let book = self.book();

        let assigned = book.placement.total();
        if assigned >= self.target_workers {
            return Ok(None);
        }
        let needed = self.target_workers - assigned;

        let hosts = book.placement.candidate_hosts(known_hosts, self.max_per_host);
        if (hosts.len() as u64) * u64::from(self.max_per_host) < u64::from(needed) {
            return Err(CoordinatorError::CapacityInsufficient {
                needed,
                hosts: hosts.len(),
                per_host: self.max_per_host,
            });
        }

        let outstanding = book.outstanding.reset(needed);
        Ok(Some(Round {
            needed,
            hosts,
            outstanding,
        }))
    }

    // ── Launch dispatch ─────────────────────────────────────────────

    /// Launch the master in the first container and hand back the rest.
    ///
    /// The master latch opens only after a successful launch; a failed
    /// launch leaves the bring-up waiting.
    fn launch_master(&self, containers: Vec<Container>) {
        let Some((container, extra)) = containers.split_first() else {
            warn!("master launch called with no containers");
            return;
        };
        if !extra.is_empty() {
            warn!(
                count = containers.len(),
                "multiple containers allocated for the master, releasing all but one"
            );
            for surplus in extra {
                self.rm.release_assigned_container(&surplus.id);
            }
        }

        let ctx = self.template.master_context();

        info!(
            container = %container.id,
            node = %container.node_http_address,
            command = %ctx.commands.join(" "),
            "launching master container"
        );
        match self.nm.start_container(container, &ctx) {
            Ok(()) => {
                let address = container.net_address().to_string();
                info!(%address, "master launched");
                if self.master_address.set(address).is_err() {
                    warn!("master address already recorded");
                }
                self.master_allocated.count_down();
            }
            Err(e) => {
                error!(container = %container.id, error = %e, "error launching master container");
            }
        }
    }

    /// Launch or release each container, answering one round request per
    /// container either way.
    fn launch_workers(&self, containers: Vec<Container>) {
        let master_address = self.master_address().unwrap_or_default();
        let ctx = self.template.worker_context(master_address);

        for container in &containers {
            let host = container.host.as_str();
            let mut book = self.book();

            let have_enough = book.placement.total() >= self.target_workers;
            let host_full = book.placement.is_full(host, self.max_per_host);

            if have_enough || host_full {
                info!(%host, container = %container.id, have_enough, host_full, "releasing assigned container");
                self.rm.release_assigned_container(&container.id);
            } else {
                info!(
                    container = %container.id,
                    worker = book.placement.total(),
                    node = %container.node_http_address,
                    "launching worker container"
                );
                match self.nm.start_container(container, &ctx) {
                    Ok(()) => {
                        book.placement.add(host);
                    }
                    Err(e) => {
                        error!(container = %container.id, error = %e, "error launching worker container");
                    }
                }
            }

            let left = book.outstanding.count_down();
            debug!(outstanding = left, "worker request answered");
        }
    }
}

impl AllocationHandler for Router {
    fn on_containers_allocated(&self, containers: Vec<Container>) {
        if self.master_allocated.is_open() {
            self.launch_workers(containers);
        } else {
            self.launch_master(containers);
        }
    }

    fn on_containers_completed(&self, statuses: Vec<ContainerStatus>) {
        for status in statuses {
            // Releasing surplus containers produces these, so they are not errors.
            if status.exit_status.is_aborted() {
                info!(container = %status.id, "aborted container");
            } else {
                error!(
                    container = %status.id,
                    exit_status = %status.exit_status,
                    diagnostics = %status.diagnostics,
                    "container completed"
                );
            }
        }
    }

    fn on_nodes_updated(&self, _reports: Vec<NodeReport>) {}

    fn on_shutdown_request(&self) {
        if self.done.count_down() {
            info!("shutdown requested");
            self.advance(Phase::ShutdownRequested);
        }
    }

    fn on_error(&self, error: anyhow::Error) {
        debug!(error = %error, "resource manager reported an error");
    }

    fn progress(&self) -> f32 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{container, template, RecordingNodeManager, RecordingResourceManager};

    fn router(target: u32, per_host: u32) -> (Router, Arc<RecordingResourceManager>, Arc<RecordingNodeManager>) {
        let rm = Arc::new(RecordingResourceManager::default());
        let nm = Arc::new(RecordingNodeManager::default());
        let router = Router::new(rm.clone(), nm.clone(), template(), target, per_host);
        (router, rm, nm)
    }

    fn hosts(names: &[&str]) -> BTreeSet<Host> {
        names.iter().map(|h| h.to_string()).collect()
    }

    /// Launch the master so later allocations route to workers.
    fn with_master(router: &Router) {
        router.on_containers_allocated(vec![container("m-1", "master-host")]);
        assert!(router.master_allocated().is_open());
    }

    #[test]
    fn first_allocation_launches_master() {
        let (router, _rm, nm) = router(1, 1);
        router.on_containers_allocated(vec![container("c-1", "h1")]);

        assert!(router.master_allocated().is_open());
        assert_eq!(router.master_address(), Some("h1"));
        assert_eq!(router.worker_count(), 0);
        let launched = nm.launched();
        assert_eq!(launched.len(), 1);
        assert!(launched[0].1.commands[0].contains(" master "));
    }

    #[test]
    fn surplus_master_containers_are_not_launched() {
        let (router, rm, nm) = router(1, 1);
        router.on_containers_allocated(vec![container("c-1", "h1"), container("c-2", "h2")]);

        assert_eq!(nm.launched().len(), 1);
        assert_eq!(nm.launched()[0].0.id.0, "c-1");
        assert_eq!(rm.released(), vec!["c-2"]);
        assert!(router.master_allocated().is_open());
    }

    #[test]
    fn empty_master_allocation_is_ignored() {
        let (router, _rm, nm) = router(1, 1);
        router.on_containers_allocated(vec![]);

        assert!(!router.master_allocated().is_open());
        assert!(nm.launched().is_empty());
    }

    #[test]
    fn failed_master_launch_keeps_latch_closed() {
        let (router, _rm, nm) = router(1, 1);
        nm.fail_on("h1");
        router.on_containers_allocated(vec![container("c-1", "h1")]);

        assert!(!router.master_allocated().is_open());
        assert_eq!(router.master_address(), None);

        // The next allocation still routes to the master.
        router.on_containers_allocated(vec![container("c-2", "h2")]);
        assert!(router.master_allocated().is_open());
        assert_eq!(router.master_address(), Some("h2"));
    }

    #[test]
    fn worker_over_allocation_releases_extras() {
        let (router, rm, nm) = router(3, 1);
        with_master(&router);

        let round = router.plan_round(&hosts(&["h1", "h2", "h3", "h4"])).unwrap().unwrap();
        assert_eq!(round.needed, 3);

        router.on_containers_allocated(vec![
            container("w-1", "h1"),
            container("w-2", "h2"),
            container("w-3", "h3"),
            container("w-4", "h4"),
        ]);

        assert_eq!(router.worker_count(), 3);
        assert_eq!(nm.launched().len(), 1 + 3);
        assert_eq!(rm.released(), vec!["w-4"]);
        assert_eq!(router.outstanding(), 0);
    }

    #[test]
    fn full_host_is_released() {
        let (router, rm, _nm) = router(3, 1);
        with_master(&router);
        router.plan_round(&hosts(&["h1", "h2", "h3"])).unwrap().unwrap();

        router.on_containers_allocated(vec![container("w-1", "h1"), container("w-2", "h1")]);

        assert_eq!(router.worker_hosts(), vec![("h1".to_string(), 1)]);
        assert_eq!(rm.released(), vec!["w-2"]);
        assert_eq!(router.outstanding(), 1);
    }

    #[test]
    fn worker_environment_carries_master_address() {
        let (router, _rm, nm) = router(1, 1);
        router.on_containers_allocated(vec![container("m-1", "10.1.1.1")]);
        router.plan_round(&hosts(&["h1"])).unwrap().unwrap();
        router.on_containers_allocated(vec![container("w-1", "h1")]);

        let launched = nm.launched();
        let worker_ctx = &launched[1].1;
        assert_eq!(worker_ctx.environment["APP_MASTER_HOSTNAME"], "10.1.1.1");
    }

    #[test]
    fn round_counter_drains_regardless_of_outcome() {
        let (router, rm, nm) = router(3, 1);
        with_master(&router);
        nm.fail_on("h2");

        let round = router.plan_round(&hosts(&["h1", "h2", "h3"])).unwrap().unwrap();
        assert_eq!(*round.outstanding.borrow(), 3);

        // One launch, one failed launch, one release of a full host.
        router.on_containers_allocated(vec![container("w-1", "h1")]);
        router.on_containers_allocated(vec![container("w-2", "h2")]);
        router.on_containers_allocated(vec![container("w-3", "h1")]);

        assert_eq!(router.outstanding(), 0);
        assert_eq!(router.worker_count(), 1);
        assert_eq!(rm.released(), vec!["w-3"]);
    }

    #[test]
    fn unsolicited_container_after_drain_does_not_underflow() {
        let (router, _rm, _nm) = router(1, 1);
        with_master(&router);
        router.plan_round(&hosts(&["h1", "h2"])).unwrap().unwrap();

        router.on_containers_allocated(vec![container("w-1", "h1")]);
        router.on_containers_allocated(vec![container("w-2", "h2")]);

        assert_eq!(router.outstanding(), 0);
        assert_eq!(router.worker_count(), 1);
    }

    #[test]
    fn plan_round_rejects_insufficient_capacity() {
        let (router, _rm, _nm) = router(3, 1);
        let err = router.plan_round(&hosts(&["h1", "h2"])).unwrap_err();

        assert!(matches!(
            err,
            CoordinatorError::CapacityInsufficient { needed: 3, hosts: 2, per_host: 1 }
        ));
        assert_eq!(router.outstanding(), 0);
    }

    #[test]
    fn plan_round_counts_per_host_capacity() {
        let (router, _rm, _nm) = router(4, 2);
        let round = router.plan_round(&hosts(&["h1", "h2"])).unwrap().unwrap();
        assert_eq!(round.needed, 4);
        assert_eq!(round.hosts, vec!["h1", "h2"]);
    }

    #[test]
    fn plan_round_is_none_when_target_met() {
        let (router, _rm, _nm) = router(1, 1);
        with_master(&router);
        router.plan_round(&hosts(&["h1"])).unwrap().unwrap();
        router.on_containers_allocated(vec![container("w-1", "h1")]);

        assert!(router.plan_round(&hosts(&["h1", "h2"])).unwrap().is_none());
    }

    #[test]
    fn plan_round_skips_saturated_hosts() {
        let (router, _rm, _nm) = router(2, 1);
        with_master(&router);
        router.plan_round(&hosts(&["h1", "h2", "h3"])).unwrap().unwrap();
        router.on_containers_allocated(vec![container("w-1", "h1")]);

        let round = router.plan_round(&hosts(&["h1", "h2", "h3"])).unwrap().unwrap();
        assert_eq!(round.needed, 1);
        assert_eq!(round.hosts, vec!["h2", "h3"]);
    }

    #[test]
    fn shutdown_request_is_idempotent() {
        let (router, _rm, _nm) = router(1, 1);
        router.on_shutdown_request();
        router.on_shutdown_request();
        router.on_shutdown_request();

        assert!(router.done().is_open());
        assert_eq!(router.phase(), Phase::ShutdownRequested);
    }

    #[test]
    fn completions_and_node_updates_do_not_change_state() {
        let (router, rm, nm) = router(1, 1);
        router.on_containers_completed(vec![
            ContainerStatus {
                id: "c-1".into(),
                exit_status: slotmaster_core::ExitStatus::ABORTED,
                diagnostics: String::new(),
            },
            ContainerStatus {
                id: "c-2".into(),
                exit_status: slotmaster_core::ExitStatus(143),
                diagnostics: "killed".to_string(),
            },
        ]);
        router.on_nodes_updated(vec![NodeReport {
            host: "h1".to_string(),
            healthy: false,
        }]);
        router.on_error(anyhow::anyhow!("heartbeat failed"));

        assert!(rm.released().is_empty());
        assert!(nm.launched().is_empty());
        assert_eq!(router.worker_count(), 0);
        assert_eq!(router.progress(), 0.0);
    }

    #[test]
    fn advance_ignores_backward_moves() {
        let (router, _rm, _nm) = router(1, 1);
        router.advance(Phase::Running);
        router.advance(Phase::Started);
        assert_eq!(router.phase(), Phase::Running);
    }

    proptest::proptest! {
        /// Whatever candidate host the resource manager picks for each
        /// request, rounds end at exactly the target, no host goes over
        /// its cap, and each round drains one answer at a time.
        #[test]
        fn rounds_reach_target_within_cap(
            target in 0u32..12,
            per_host in 1u32..4,
            spare_hosts in 0u32..4,
            picks in proptest::collection::vec(proptest::prelude::any::<proptest::sample::Index>(), 1..64),
        ) {
            let host_count = target.div_ceil(per_host).max(1) + spare_hosts;
            let known: BTreeSet<Host> = (0..host_count).map(|i| format!("h{i}")).collect();
            let (router, _rm, _nm) = router(target, per_host);
            with_master(&router);

            let mut picks = picks.iter().cycle();
            let mut rounds = 0;
            let mut next_id = 0;
            while let Some(round) = router.plan_round(&known).unwrap() {
                rounds += 1;
                proptest::prop_assert!(rounds <= crate::coordinator::MAX_WORKER_REQUEST_ROUNDS);
                proptest::prop_assert_eq!(router.outstanding(), round.needed);

                for answered in 1..=round.needed {
                    let host = picks.next().unwrap().get(&round.hosts).clone();
                    next_id += 1;
                    router.on_containers_allocated(vec![container(&format!("w-{next_id}"), &host)]);
                    proptest::prop_assert_eq!(router.outstanding(), round.needed - answered);
                }

                for (host, count) in router.worker_hosts() {
                    proptest::prop_assert!(count <= per_host, "{} runs {} workers", host, count);
                }
            }

            proptest::prop_assert_eq!(router.worker_count(), target);
        }
    }
}
