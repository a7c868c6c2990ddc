//! Periodic background verification.
//!
//! Once started, the scheduler verifies the license every interval while
//! the network is reachable. Ticks that fall while offline are skipped, not
//! queued. Stopping is synchronous: when [`HeartbeatScheduler::stop`]
//! returns, the halted flag is set and the task is aborted, so no further
//! verification starts.

use crate::connectivity::ConnectivityMonitor;
use crate::verify::{verify_and_apply, VerifyOutcome};
use shield_license::{Clock, LicenseStateMachine};
use shield_server::LicenseServer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Background verifier.
pub struct HeartbeatScheduler {
    interval: Duration,
    machine: Arc<LicenseStateMachine>,
    server: Arc<dyn LicenseServer>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    halted: Arc<AtomicBool>,
    verifications: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatScheduler {
    pub fn new(
        interval: Duration,
        machine: Arc<LicenseStateMachine>,
        server: Arc<dyn LicenseServer>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            interval,
            machine,
            server,
            connectivity,
            clock,
            halted: Arc::new(AtomicBool::new(false)),
            verifications: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Starts the heartbeat. No-op if already running or stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() || self.halted.load(Ordering::SeqCst) {
            return;
        }

        info!(interval_secs = self.interval.as_secs(), "heartbeat started");
        *task = Some(tokio::spawn(Self::run(
            self.interval,
            Arc::clone(&self.machine),
            Arc::clone(&self.server),
            Arc::clone(&self.connectivity),
            Arc::clone(&self.clock),
            Arc::clone(&self.halted),
            Arc::clone(&self.verifications),
        )));
    }

    /// Stops the heartbeat for good. Idempotent.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        let was_halted = self.halted.swap(true, Ordering::SeqCst);
        if let Some(handle) = task.take() {
            handle.abort();
        }
        if !was_halted {
            info!("heartbeat stopped");
        }
    }

    /// Returns true while the background task is scheduled.
    pub fn is_running(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        task.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Number of verifications issued so far.
    pub fn verifications(&self) -> u64 {
        self.verifications.load(Ordering::SeqCst)
    }

    async fn run(
        period: Duration,
        machine: Arc<LicenseStateMachine>,
        server: Arc<dyn LicenseServer>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
        halted: Arc<AtomicBool>,
        verifications: Arc<AtomicU64>,
    ) {
        // First tick one full period after start; the startup check just ran.
        let Some(first_tick) = Instant::now().checked_add(period) else {
            error!(
                interval_secs = period.as_secs(),
                "heartbeat interval out of range, not scheduling"
            );
            return;
        };
        let mut ticker = tokio::time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if halted.load(Ordering::SeqCst) {
                break;
            }
            if !connectivity.current().is_reachable() {
                debug!("heartbeat tick skipped while offline");
                continue;
            }

            verifications.fetch_add(1, Ordering::SeqCst);
            match verify_and_apply(server.as_ref(), &machine, clock.as_ref()).await {
                VerifyOutcome::Confirmed { expires_at } => {
                    debug!(?expires_at, "heartbeat verification succeeded");
                }
                VerifyOutcome::Rejected(reason) => {
                    warn!(%reason, "heartbeat verification rejected");
                }
                VerifyOutcome::Unresolved(e) => {
                    debug!(error = %e, "heartbeat verification unresolved");
                }
            }
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}
