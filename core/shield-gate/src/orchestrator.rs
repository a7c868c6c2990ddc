//! Startup reconciliation of an expired license.
//!
//! The orchestrator owns the wait, not the request: verification runs on
//! its own task and applies whatever the server says, while the caller
//! waits at most the reconciliation deadline. A late success therefore
//! still renews the record for the next check.

use crate::connectivity::ConnectivityMonitor;
use crate::verdict::{DenialReason, Verdict};
use crate::verify::{verify_and_apply, VerifyOutcome};
use shield_license::{Clock, LicenseStateMachine, LicenseStatus};
use shield_server::LicenseServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Decides whether an expired license may run.
pub struct ReconciliationOrchestrator {
    machine: Arc<LicenseStateMachine>,
    server: Option<Arc<dyn LicenseServer>>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
}

impl ReconciliationOrchestrator {
    /// `server` is `None` when the installation has no licensing server.
    pub fn new(
        machine: Arc<LicenseStateMachine>,
        server: Option<Arc<dyn LicenseServer>>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            machine,
            server,
            connectivity,
            clock,
        }
    }

    /// Resolves an `Expired` status into a verdict within `deadline`.
    ///
    /// - No server: deny.
    /// - Offline: grace evaluation decides.
    /// - Online: the server's explicit answer decides; no answer within the
    ///   deadline (or a transport failure) falls back to grace evaluation.
    pub async fn resolve_expired(&self, deadline: Duration) -> Verdict {
        let Some(server) = self.server.clone() else {
            info!("license expired and no licensing server configured");
            return Verdict::Deny(DenialReason::Expired);
        };

        if !self.connectivity.current().is_reachable() {
            info!("license expired while offline, evaluating grace period");
            return self.grace_fallback();
        }

        let (tx, rx) = oneshot::channel();
        let machine = Arc::clone(&self.machine);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            let outcome = verify_and_apply(server.as_ref(), &machine, clock.as_ref()).await;
            // The receiver is gone once the deadline passed; the record is
            // already updated either way.
            let _ = tx.send(outcome);
        });

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(VerifyOutcome::Confirmed { expires_at })) => {
                info!(?expires_at, "expired license reconciled with server");
                Verdict::Allow
            }
            Ok(Ok(VerifyOutcome::Rejected(reason))) => Verdict::Deny(DenialReason::Rejected(reason)),
            Ok(Ok(VerifyOutcome::Unresolved(e))) => {
                warn!(error = %e, "reconciliation unresolved, evaluating grace period");
                self.grace_fallback()
            }
            Ok(Err(_)) => {
                error!("verification task ended without an outcome");
                self.grace_fallback()
            }
            Err(_) => {
                warn!(?deadline, "reconciliation deadline elapsed, evaluating grace period");
                self.grace_fallback()
            }
        }
    }

    fn grace_fallback(&self) -> Verdict {
        match self.machine.evaluate_grace(self.clock.now()) {
            Ok(LicenseStatus::Active | LicenseStatus::GraceActive) => Verdict::Allow,
            Ok(LicenseStatus::GraceExpired) => Verdict::Deny(DenialReason::GraceExpired),
            Ok(LicenseStatus::Tampered) => Verdict::Deny(DenialReason::Tampered),
            Ok(status) => {
                error!(%status, "unexpected status during grace evaluation");
                Verdict::Deny(DenialReason::Expired)
            }
            Err(e) => Verdict::Deny(DenialReason::Storage(e.to_string())),
        }
    }
}
