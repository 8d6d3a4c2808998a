//! Host placement tracker.

use std::collections::HashMap;

use tracing::debug;

use slotmaster_core::Host;

/// Multiset of hosts that have a launched worker.
#[derive(Debug, Clone, Default)]
pub struct HostPlacement {
    /// Host → number of workers launched there.
    counts: HashMap<Host, u32>,
    /// Sum of all counts.
    total: u32,
}

impl HostPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workers on `host`.
    pub fn count(&self, host: &str) -> u32 {
        self.counts.get(host).copied().unwrap_or(0)
    }

    /// Total workers across all hosts.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Whether `host` already runs `cap` or more workers.
    pub fn is_full(&self, host: &str, cap: u32) -> bool {
        self.count(host) >= cap
    }

    /// Record a worker launched on `host`. Returns the new count there.
    ///
    /// Only call this after the node manager confirmed the launch.
    pub fn add(&mut self, host: &str) -> u32 {
        let count = self.counts.entry(host.to_string()).or_insert(0);
        *count += 1;
        self.total += 1;
        debug!(%host, count = *count, total = self.total, "worker recorded");
        *count
    }

    /// Hosts from `known` still below `cap`, in the order given.
    ///
    /// Empty when every known host is saturated.
    pub fn candidate_hosts<I, S>(&self, known: I, cap: u32) -> Vec<Host>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        known
            .into_iter()
            .filter(|h| !self.is_full(h.as_ref(), cap))
            .map(|h| h.as_ref().to_string())
            .collect()
    }

    /// Hosts with at least one worker, with their counts.
    pub fn hosts(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(h, c)| (h.as_str(), *c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let p = HostPlacement::new();
        assert_eq!(p.total(), 0);
        assert_eq!(p.count("h1"), 0);
        assert_eq!(p.hosts().count(), 0);
    }

    #[test]
    fn add_counts_per_host() {
        let mut p = HostPlacement::new();
        assert_eq!(p.add("h1"), 1);
        assert_eq!(p.add("h1"), 2);
        assert_eq!(p.add("h2"), 1);

        assert_eq!(p.count("h1"), 2);
        assert_eq!(p.count("h2"), 1);
        assert_eq!(p.total(), 3);
    }

    #[test]
    fn candidates_exclude_full_hosts() {
        let mut p = HostPlacement::new();
        p.add("h1");
        p.add("h2");
        p.add("h2");

        let known = ["h1", "h2", "h3"];
        assert_eq!(p.candidate_hosts(known, 2), vec!["h1", "h3"]);
        assert_eq!(p.candidate_hosts(known, 1), vec!["h3"]);
    }

    #[test]
    fn candidates_empty_when_saturated() {
        let mut p = HostPlacement::new();
        p.add("h1");
        p.add("h2");

        assert!(p.candidate_hosts(["h1", "h2"], 1).is_empty());
    }

    #[test]
    fn candidates_keep_input_order() {
        let p = HostPlacement::new();
        let known = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(p.candidate_hosts(&known, 1), vec!["c", "a", "b"]);
    }

    #[test]
    fn is_full_respects_cap() {
        let mut p = HostPlacement::new();
        p.add("h1");
        assert!(p.is_full("h1", 1));
        assert!(!p.is_full("h1", 2));
        assert!(!p.is_full("h2", 1));
    }
}
