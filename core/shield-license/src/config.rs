//! Gate configuration.
//!
//! Every tunable of the gate lives here and is passed in at construction.
//! Partial JSON files are accepted; missing fields take the defaults below.

use crate::error::{LicenseError, LicenseResult};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest accepted trial (100 years).
pub const MAX_TRIAL_DAYS: u32 = 36_500;
/// Longest accepted offline grace window (10 years).
pub const MAX_GRACE_PERIOD_HOURS: u32 = 87_600;
/// Longest accepted heartbeat interval (one year).
pub const MAX_HEARTBEAT_INTERVAL_SECS: u64 = 365 * 24 * 3600;

/// Configuration for the license gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Application identifier sent to the server (also the `X-App-ID` header).
    pub app_id: String,
    /// Human-readable application name.
    pub app_name: String,
    /// Bundle identifier of the protected application.
    pub bundle_id: String,
    /// Length of the implicit first-run trial.
    pub trial_days: u32,
    /// Offline grace window once an expired license cannot reach the server.
    pub grace_period_hours: u32,
    /// Interval between background verifications.
    pub heartbeat_interval_secs: u64,
    /// Backward clock movement tolerated between two checks.
    pub backward_tolerance_secs: u64,
    /// Largest forward clock movement tolerated between two checks.
    pub max_forward_jump_days: u32,
    /// Whether a licensing server exists at all.
    pub server_enabled: bool,
    /// Base URL of the licensing server (e.g. `https://licenses.example.com/api`).
    pub server_url: String,
    /// Outer deadline for the startup reconciliation decision (ms).
    pub reconcile_deadline_ms: u64,
    /// Per-request transport timeout (seconds).
    pub request_timeout_secs: u64,
    /// Base64 Ed25519 verifying key for signed license payloads.
    pub public_key: Option<String>,
    /// Prefix for every credential-store key.
    pub store_namespace: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            app_id: "com.example.app".to_string(),
            app_name: "Shielded App".to_string(),
            bundle_id: "com.example.app.runner".to_string(),
            trial_days: 30,
            grace_period_hours: 72,
            heartbeat_interval_secs: 3600,
            backward_tolerance_secs: 5 * 60,
            max_forward_jump_days: 366,
            server_enabled: false,
            server_url: String::new(),
            reconcile_deadline_ms: 10_000,
            request_timeout_secs: 15,
            public_key: None,
            store_namespace: "shield".to_string(),
        }
    }
}

impl LicenseConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the file cannot be read, or `Serialization`
    /// if it is not valid JSON for this structure.
    pub fn from_json_file(path: &Path) -> LicenseResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LicenseError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Checks that the configuration describes a gate that can operate.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` naming the first offending field.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.trial_days == 0 {
            return Err(LicenseError::Configuration("trial_days must be > 0".into()));
        }
        if self.grace_period_hours == 0 {
            return Err(LicenseError::Configuration(
                "grace_period_hours must be > 0".into(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(LicenseError::Configuration(
                "heartbeat_interval_secs must be > 0".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(LicenseError::Configuration(
                "request_timeout_secs must be > 0".into(),
            ));
        }
        if self.trial_days > MAX_TRIAL_DAYS {
            return Err(LicenseError::Configuration(format!(
                "trial_days must be <= {MAX_TRIAL_DAYS}"
            )));
        }
        if self.grace_period_hours > MAX_GRACE_PERIOD_HOURS {
            return Err(LicenseError::Configuration(format!(
                "grace_period_hours must be <= {MAX_GRACE_PERIOD_HOURS}"
            )));
        }
        if self.heartbeat_interval_secs > MAX_HEARTBEAT_INTERVAL_SECS {
            return Err(LicenseError::Configuration(format!(
                "heartbeat_interval_secs must be <= {MAX_HEARTBEAT_INTERVAL_SECS}"
            )));
        }
        if self.reconcile_deadline_ms == 0 {
            return Err(LicenseError::Configuration(
                "reconcile_deadline_ms must be > 0".into(),
            ));
        }
        if self.server_enabled {
            let url = self.server_url.trim();
            if url.is_empty() {
                return Err(LicenseError::Configuration(
                    "server_enabled requires server_url".into(),
                ));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(LicenseError::Configuration(format!(
                    "server_url must be http(s): {url}"
                )));
            }
        }
        Ok(())
    }

    /// Trial length.
    #[must_use]
    pub fn trial(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.trial_days))
    }

    /// Offline grace window.
    #[must_use]
    pub fn grace_period(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.grace_period_hours))
    }

    #[must_use]
    pub fn backward_tolerance(&self) -> TimeDelta {
        i64::try_from(self.backward_tolerance_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    #[must_use]
    pub fn max_forward_jump(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.max_forward_jump_days))
    }

    /// Heartbeat period.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Outer reconciliation deadline.
    #[must_use]
    pub fn reconcile_deadline(&self) -> Duration {
        Duration::from_millis(self.reconcile_deadline_ms)
    }

    /// Transport timeout for a single server request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
