//! Manual license key activation.
//!
//! The key is persisted before anything else so it survives a failed
//! attempt. Nothing else in the record changes unless the activation
//! succeeds. Keys shaped like a signed payload are verified locally first
//! when a public key is configured, so a forged key never reaches the
//! server.

use crate::verdict::{DenialReason, Verdict};
use shield_license::{
    looks_signed, Clock, LicenseError, LicenseStateMachine, SignatureVerifier, SignedPayload,
};
use shield_server::{LicenseServer, ServerRequest};
use std::sync::Arc;
use tracing::{info, warn};

/// Redeems license keys against the server (or locally when there is none).
pub struct ActivationFlow {
    machine: Arc<LicenseStateMachine>,
    server: Option<Arc<dyn LicenseServer>>,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn SignatureVerifier>,
    public_key: Option<Vec<u8>>,
}

impl ActivationFlow {
    pub fn new(
        machine: Arc<LicenseStateMachine>,
        server: Option<Arc<dyn LicenseServer>>,
        clock: Arc<dyn Clock>,
        verifier: Arc<dyn SignatureVerifier>,
        public_key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            machine,
            server,
            clock,
            verifier,
            public_key,
        }
    }

    /// Attempts to activate `key`.
    pub async fn activate(&self, key: &str) -> Verdict {
        let key = key.trim();
        if key.is_empty() {
            return Verdict::Deny(DenialReason::Rejected("empty license key".to_string()));
        }

        if let Err(e) = self.machine.store_license_key(key) {
            return Verdict::Deny(DenialReason::Storage(e.to_string()));
        }

        let signed_days = match self.open_signed(key) {
            Ok(days) => days,
            Err(e) => {
                warn!(error = %e, "license key failed local verification");
                return Verdict::Deny(DenialReason::Rejected(e.to_string()));
            }
        };

        let trial_days = i64::from(self.machine.config().trial_days);
        let days = match &self.server {
            None => {
                info!("no licensing server, activating locally");
                signed_days.unwrap_or(trial_days)
            }
            Some(server) => match self.ask_server(server.as_ref(), key).await {
                Ok(granted) => granted.or(signed_days).unwrap_or(trial_days),
                Err(reason) => return Verdict::Deny(reason),
            },
        };

        match self.machine.extend(self.clock.now(), days) {
            Ok(expires_at) => {
                info!(days, expires_at = %expires_at, "license key activated");
                Verdict::Allow
            }
            Err(e) => {
                warn!(error = %e, "failed to persist activation");
                Verdict::Deny(DenialReason::Storage(e.to_string()))
            }
        }
    }

    /// Verifies a signed key. `Ok(None)` for keys that are not signed
    /// payloads or when no public key is configured.
    fn open_signed(&self, key: &str) -> Result<Option<i64>, LicenseError> {
        let Some(public_key) = &self.public_key else {
            return Ok(None);
        };
        if !looks_signed(key) {
            return Ok(None);
        }
        let payload = SignedPayload::open(key, self.verifier.as_ref(), public_key)?;
        Ok(payload.expiry_days())
    }

    /// Returns the extension the server granted, if any.
    async fn ask_server(
        &self,
        server: &dyn LicenseServer,
        key: &str,
    ) -> Result<Option<i64>, DenialReason> {
        let device_id = self
            .machine
            .device_id()
            .map_err(|e| DenialReason::Storage(e.to_string()))?;
        let config = self.machine.config();
        let request = ServerRequest::activate(
            device_id,
            config.app_id.as_str(),
            config.bundle_id.as_str(),
            key,
            self.clock.now(),
        );

        match server.activate(request).await {
            Ok(response) if response.success => Ok(response.requested_extension()),
            Ok(response) => {
                warn!(reason = response.reason(), "server rejected license key");
                Err(DenialReason::Rejected(response.reason().to_string()))
            }
            Err(e) => {
                let error = LicenseError::from(e);
                warn!(error = %error, "activation request failed");
                Err(DenialReason::Unreachable(error.to_string()))
            }
        }
    }
}
