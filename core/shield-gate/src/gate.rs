//! The host-facing license gate.

use crate::activation::ActivationFlow;
use crate::connectivity::{ConnectivityMonitor, ManualConnectivity};
use crate::heartbeat::HeartbeatScheduler;
use crate::orchestrator::ReconciliationOrchestrator;
use crate::verdict::{DenialReason, Verdict};
use crate::watcher::ConnectivityWatcher;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shield_license::{
    decode_public_key, Clock, CredentialStore, Ed25519Verifier, LicenseConfig, LicenseError,
    LicenseResult, LicenseStateMachine, LicenseStatus, Reachability, SignatureVerifier, SystemClock,
};
use shield_server::LicenseServer;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Entry point for the protected application.
///
/// Call [`LicenseGate::check_license`] once at startup and refuse to run on
/// [`Verdict::Deny`]. A denial is final for the lifetime of the gate: every
/// later check returns the same denial without touching the server.
pub struct LicenseGate {
    machine: Arc<LicenseStateMachine>,
    clock: Arc<dyn Clock>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    orchestrator: ReconciliationOrchestrator,
    activation: ActivationFlow,
    heartbeat: Option<HeartbeatScheduler>,
    watcher: Option<ConnectivityWatcher>,
    denial: Mutex<Option<DenialReason>>,
}

/// Snapshot for display and diagnostics. Never carries the license key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseInfo {
    /// Status derived without touching the record; `None` if it could not
    /// be derived.
    pub status: Option<LicenseStatus>,
    pub app_name: String,
    pub device_id: Option<String>,
    pub activated: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub grace_period_started_at: Option<DateTime<Utc>>,
    pub last_server_contact_at: Option<DateTime<Utc>>,
    pub has_license_key: bool,
    pub server_enabled: bool,
    pub locked: bool,
    pub denial: Option<String>,
}

impl LicenseGate {
    /// Starts building a gate over `config`.
    pub fn builder(config: LicenseConfig) -> LicenseGateBuilder {
        LicenseGateBuilder::new(config)
    }

    /// Runs the startup license check.
    pub async fn check_license(&self) -> Verdict {
        if let Some(reason) = self.denial() {
            return Verdict::Deny(reason);
        }

        let now = self.clock.now();
        let reachability = self.connectivity.current();
        let config = self.machine.config();
        info!(
            app = %config.app_name,
            server_enabled = config.server_enabled,
            ?reachability,
            "license check started"
        );

        let verdict = match self.machine.status(now, reachability) {
            Ok(LicenseStatus::NotActivated) => self.start_trial(now, reachability),
            Ok(LicenseStatus::Active | LicenseStatus::GraceActive) => Verdict::Allow,
            Ok(LicenseStatus::Tampered) => Verdict::Deny(DenialReason::Tampered),
            Ok(LicenseStatus::GraceExpired) => Verdict::Deny(DenialReason::GraceExpired),
            Ok(LicenseStatus::Expired) => {
                self.orchestrator
                    .resolve_expired(config.reconcile_deadline())
                    .await
            }
            Err(e) => Verdict::Deny(DenialReason::Storage(e.to_string())),
        };

        match verdict {
            Verdict::Allow => {
                // A concurrent check may have denied while this one ran.
                if let Some(reason) = self.denial() {
                    return Verdict::Deny(reason);
                }
                self.start_background();
                info!("license check passed");
                Verdict::Allow
            }
            Verdict::Deny(reason) => Verdict::Deny(self.lock(reason)),
        }
    }

    fn start_trial(&self, now: DateTime<Utc>, reachability: Reachability) -> Verdict {
        match self.machine.activate_trial(now) {
            Ok(_) => Verdict::Allow,
            // Another trigger activated first; its record decides.
            Err(LicenseError::AlreadyActivated) => match self.machine.status(now, reachability) {
                Ok(status) if status.is_usable() => Verdict::Allow,
                Ok(status) => {
                    warn!(%status, "trial raced with another activation");
                    Verdict::Deny(DenialReason::Expired)
                }
                Err(e) => Verdict::Deny(DenialReason::Storage(e.to_string())),
            },
            Err(e) => Verdict::Deny(DenialReason::Storage(e.to_string())),
        }
    }

    /// Redeems a license key.
    ///
    /// Activation never lifts a denial that was already acted on; the host
    /// restarts to run with the new license.
    pub async fn activate_with_key(&self, key: &str) -> Verdict {
        self.activation.activate(key).await
    }

    /// Returns a display snapshot of the license. Read-only: the record is
    /// not modified.
    pub fn info(&self) -> LicenseInfo {
        let record = self.machine.record();
        let config = self.machine.config();
        let now = self.clock.now();
        let denial = self.denial();
        let status = match self.machine.peek_status(now, self.connectivity.current()) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "could not derive license status");
                None
            }
        };
        LicenseInfo {
            status,
            app_name: config.app_name.clone(),
            device_id: record.device_id,
            activated: record.activated,
            activated_at: record.activated_at,
            expires_at: record.expires_at,
            days_remaining: record
                .expires_at
                .map(|expiry| (expiry - now).num_days().max(0)),
            grace_period_started_at: record.grace_period_started_at,
            last_server_contact_at: record.last_server_contact_at,
            has_license_key: record.license_key.is_some(),
            server_enabled: config.server_enabled,
            locked: denial.is_some(),
            denial: denial.map(|reason| reason.message()),
        }
    }

    /// The state machine behind this gate.
    pub fn machine(&self) -> &LicenseStateMachine {
        &self.machine
    }

    /// Returns true once a denial has been acted on.
    pub fn is_locked(&self) -> bool {
        self.denial().is_some()
    }

    /// The denial acted on, if any.
    pub fn denial(&self) -> Option<DenialReason> {
        self.denial.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns true while the heartbeat is scheduled.
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(HeartbeatScheduler::is_running)
    }

    /// Verifications the heartbeat has issued.
    pub fn heartbeat_verifications(&self) -> u64 {
        self.heartbeat
            .as_ref()
            .map_or(0, HeartbeatScheduler::verifications)
    }

    /// Stops background work for the rest of this gate's lifetime without
    /// denying. Later checks still return verdicts but never restart the
    /// heartbeat or the reconnect watcher.
    pub fn shutdown(&self) {
        self.stop_background();
        info!("license gate shut down");
    }

    fn start_background(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.start();
        }
        if let Some(watcher) = &self.watcher {
            watcher.start();
        }
    }

    fn stop_background(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.stop();
        }
        if let Some(watcher) = &self.watcher {
            watcher.stop();
        }
    }

    /// Records the denial and halts background work before returning.
    /// The first denial wins.
    fn lock(&self, reason: DenialReason) -> DenialReason {
        let acted_on = {
            let mut denial = self.denial.lock().unwrap_or_else(|e| e.into_inner());
            denial.get_or_insert(reason).clone()
        };
        self.stop_background();
        error!(reason = %acted_on, "license check denied");
        acted_on
    }
}

/// Assembles a [`LicenseGate`] from its collaborators.
pub struct LicenseGateBuilder {
    config: LicenseConfig,
    store: Option<Arc<dyn CredentialStore>>,
    server: Option<Arc<dyn LicenseServer>>,
    connectivity: Option<Arc<dyn ConnectivityMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
}

impl LicenseGateBuilder {
    fn new(config: LicenseConfig) -> Self {
        Self {
            config,
            store: None,
            server: None,
            connectivity: None,
            clock: None,
            verifier: None,
        }
    }

    /// Credential store holding the license record. Required.
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Licensing server. Required when `server_enabled` is set.
    pub fn server(mut self, server: Arc<dyn LicenseServer>) -> Self {
        self.server = Some(server);
        self
    }

    /// Defaults to an always-reachable [`ManualConnectivity`].
    pub fn connectivity(mut self, connectivity: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to [`Ed25519Verifier`].
    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Validates the configuration and builds the gate.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the configuration is invalid, no store was
    /// given, a server is required but missing, or the public key does not
    /// decode.
    pub fn build(self) -> LicenseResult<LicenseGate> {
        self.config.validate()?;

        let store = self
            .store
            .ok_or_else(|| LicenseError::Configuration("no credential store".to_string()))?;

        let server = if self.config.server_enabled {
            Some(self.server.ok_or_else(|| {
                LicenseError::Configuration(
                    "server_enabled is set but no license server was provided".to_string(),
                )
            })?)
        } else {
            if self.server.is_some() {
                warn!("license server provided but server_enabled is off, ignoring it");
            }
            None
        };

        let public_key = self
            .config
            .public_key
            .as_deref()
            .map(decode_public_key)
            .transpose()?;

        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ManualConnectivity::default()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let verifier = self.verifier.unwrap_or_else(|| Arc::new(Ed25519Verifier));
        let heartbeat_interval = self.config.heartbeat_interval();

        let machine = Arc::new(LicenseStateMachine::new(self.config, store));

        let orchestrator = ReconciliationOrchestrator::new(
            Arc::clone(&machine),
            server.clone(),
            Arc::clone(&connectivity),
            Arc::clone(&clock),
        );
        let activation = ActivationFlow::new(
            Arc::clone(&machine),
            server.clone(),
            Arc::clone(&clock),
            verifier,
            public_key,
        );
        let heartbeat = server.as_ref().map(|server| {
            HeartbeatScheduler::new(
                heartbeat_interval,
                Arc::clone(&machine),
                Arc::clone(server),
                Arc::clone(&connectivity),
                Arc::clone(&clock),
            )
        });
        let watcher = server.as_ref().map(|server| {
            ConnectivityWatcher::new(
                Arc::clone(&machine),
                Arc::clone(server),
                Arc::clone(&connectivity),
                Arc::clone(&clock),
            )
        });

        Ok(LicenseGate {
            machine,
            clock,
            connectivity,
            orchestrator,
            activation,
            heartbeat,
            watcher,
            denial: Mutex::new(None),
        })
    }
}
