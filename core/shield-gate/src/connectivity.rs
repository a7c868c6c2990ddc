//! Network reachability seam.
//!
//! Monitors publish through a `tokio::sync::watch` channel: subscribers see
//! the latest value and every change made while they are subscribed, but
//! nothing that happened before they subscribed. Dropping the receiver
//! unsubscribes.

use shield_license::Reachability;
use tokio::sync::watch;
use tracing::debug;

/// Source of reachability and reachability changes.
pub trait ConnectivityMonitor: Send + Sync {
    /// Current reachability.
    fn current(&self) -> Reachability;

    /// Subscribes to future changes.
    fn subscribe(&self) -> watch::Receiver<Reachability>;
}

/// A monitor driven by explicit [`ManualConnectivity::set`] calls.
///
/// Hosts with their own reachability source (OS notifications, health checks)
/// forward it here; tests use it to simulate outages.
#[derive(Debug)]
pub struct ManualConnectivity {
    tx: watch::Sender<Reachability>,
}

impl ManualConnectivity {
    pub fn new(initial: Reachability) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publishes a new reachability value. Repeating the current value does
    /// not notify subscribers.
    pub fn set(&self, reachability: Reachability) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == reachability {
                false
            } else {
                *current = reachability;
                true
            }
        });
        if changed {
            debug!(?reachability, "reachability changed");
        }
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(Reachability::Full)
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn current(&self) -> Reachability {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Reachability> {
        self.tx.subscribe()
    }
}
