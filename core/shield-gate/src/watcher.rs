//! Verification on reconnect.
//!
//! When the network comes back while the license is active, one
//! best-effort verification runs. Its failures are logged and never turn
//! into a denial.

use crate::connectivity::ConnectivityMonitor;
use crate::verify::{verify_and_apply, VerifyOutcome};
use shield_license::{Clock, LicenseStateMachine};
use shield_server::LicenseServer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Subscribes to reachability changes and verifies on reconnect.
pub struct ConnectivityWatcher {
    machine: Arc<LicenseStateMachine>,
    server: Arc<dyn LicenseServer>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    halted: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityWatcher {
    pub fn new(
        machine: Arc<LicenseStateMachine>,
        server: Arc<dyn LicenseServer>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            machine,
            server,
            connectivity,
            clock,
            halted: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Subscribes and starts watching. No-op if already watching or stopped.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() || self.halted.load(Ordering::SeqCst) {
            return;
        }

        let mut changes = self.connectivity.subscribe();
        let machine = Arc::clone(&self.machine);
        let server = Arc::clone(&self.server);
        let clock = Arc::clone(&self.clock);

        *task = Some(tokio::spawn(async move {
            let mut previous = *changes.borrow_and_update();
            while changes.changed().await.is_ok() {
                let current = *changes.borrow_and_update();
                let reconnected = !previous.is_reachable() && current.is_reachable();
                previous = current;
                if !reconnected {
                    continue;
                }

                let now = clock.now();
                let active = !machine.is_tamper_latched()
                    && machine.record().expires_at.is_some_and(|expiry| now < expiry);
                if !active {
                    debug!("reconnected without an active license, not verifying");
                    continue;
                }

                info!("network restored, verifying license");
                match verify_and_apply(server.as_ref(), &machine, clock.as_ref()).await {
                    VerifyOutcome::Confirmed { .. } => debug!("reconnect verification succeeded"),
                    VerifyOutcome::Rejected(reason) => {
                        warn!(%reason, "reconnect verification rejected");
                    }
                    VerifyOutcome::Unresolved(e) => {
                        debug!(error = %e, "reconnect verification unresolved");
                    }
                }
            }
            debug!("connectivity monitor closed");
        }));
    }

    /// Unsubscribes for good. Idempotent.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        self.halted.store(true, Ordering::SeqCst);
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        task.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ConnectivityWatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}
