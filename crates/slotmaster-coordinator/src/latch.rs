//! Synchronization between the delivery thread and the control task.
//!
//! Both primitives are signaled synchronously (the resource manager's
//! delivery thread is not a tokio task) and awaited asynchronously by the
//! control task. They are built on `tokio::sync::watch`, whose sender can
//! be updated from any thread without a runtime.

use tokio::sync::watch;

/// One-shot gate: starts closed, opens once, stays open.
#[derive(Debug)]
pub struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Open the latch. Returns `true` only for the call that opened it.
    pub fn count_down(&self) -> bool {
        self.tx.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        })
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch is open. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// Countdown of container requests still unanswered in the current round.
///
/// Not synchronized on its own beyond the watch channel: callers reset and
/// count it down while holding the lock that also guards host placement.
#[derive(Debug)]
pub struct RoundGate {
    tx: watch::Sender<u32>,
}

impl RoundGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Start a round expecting `outstanding` answers.
    ///
    /// Returns a receiver to wait on with [`RoundGate::wait_drained`].
    pub fn reset(&self, outstanding: u32) -> watch::Receiver<u32> {
        self.tx.send_replace(outstanding);
        self.tx.subscribe()
    }

    /// Record one answered request. Saturates at zero: containers offered
    /// after the round drained do not underflow it. Returns what is left.
    pub fn count_down(&self) -> u32 {
        let mut left = 0;
        self.tx.send_if_modified(|n| {
            if *n == 0 {
                return false;
            }
            *n -= 1;
            left = *n;
            true
        });
        left
    }

    pub fn outstanding(&self) -> u32 {
        *self.tx.borrow()
    }

    /// Wait until the round a receiver was obtained for has drained.
    pub async fn wait_drained(rx: &mut watch::Receiver<u32>) {
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for RoundGate {
    fn default() -> Self {
        Self::new()
    }
}
