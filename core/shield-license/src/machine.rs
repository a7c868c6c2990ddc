//! License validity state machine.
//!
//! The machine is the only writer of the license record. Every public
//! operation loads the record, decides, and persists inside one critical
//! section, so concurrent triggers (startup check, heartbeat, connectivity
//! callback, manual activation) never interleave their writes.

use crate::clock::{ClockIntegrityGuard, ClockVerdict};
use crate::config::LicenseConfig;
use crate::device::generate_device_id;
use crate::error::{LicenseError, LicenseResult};
use crate::record::{LicenseRecord, RecordField, RecordStore, Slot, StoredRecord};
use crate::status::{LicenseStatus, Reachability};
use crate::store::CredentialStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Per-process state that is not persisted.
#[derive(Debug, Default)]
struct Session {
    /// Set on the first tamper verdict; only an extension clears it.
    tamper_latched: bool,
}

/// Owner of the license record.
pub struct LicenseStateMachine {
    config: LicenseConfig,
    guard: ClockIntegrityGuard,
    records: RecordStore,
    session: Mutex<Session>,
}

impl LicenseStateMachine {
    /// Creates a state machine over `store`.
    pub fn new(config: LicenseConfig, store: Arc<dyn CredentialStore>) -> Self {
        let guard = ClockIntegrityGuard::new(config.backward_tolerance(), config.max_forward_jump());
        let records = RecordStore::new(store, config.store_namespace.clone());
        Self {
            config,
            guard,
            records,
            session: Mutex::new(Session::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LicenseConfig {
        &self.config
    }

    /// Enters the critical section. The protected data lives in the store,
    /// so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Status ───────────────────────────────────────────────────

    /// Computes the current status, recording `now` as the last observation.
    ///
    /// The clock check runs before `now` is persisted, so a tamper verdict
    /// is never hidden by the act of recording it. Past expiry the result
    /// depends on whether reconciliation is possible: with no server or no
    /// network the grace window is evaluated (and opened if needed),
    /// otherwise `Expired` is returned for the caller to reconcile.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a grace period had to be opened but could not be
    /// persisted, or `Configuration` if the grace window end is out of range.
    pub fn status(&self, now: DateTime<Utc>, reachability: Reachability) -> LicenseResult<LicenseStatus> {
        let mut session = self.lock();
        let record = self.records.load();

        if record.activated_at.is_absent() {
            debug!("license not activated yet");
            return Ok(LicenseStatus::NotActivated);
        }

        if session.tamper_latched {
            debug!("tamper verdict latched for this session");
            return Ok(LicenseStatus::Tampered);
        }

        // An unreadable observation cannot vouch for the clock; such a
        // record gets no credit for its expiry either.
        let integrity_known = !matches!(record.last_observed_at, Slot::Corrupt);
        if integrity_known
            && self.guard.evaluate(now, record.last_observed_at.value().copied())
                == ClockVerdict::Tampered
        {
            warn!(device_id = ?record.device_id.value(), "date manipulation detected");
            session.tamper_latched = true;
            return Ok(LicenseStatus::Tampered);
        }

        if let Err(e) = self.records.write_timestamp(RecordField::LastKnownDate, now) {
            warn!(error = %e, "failed to record last observation");
        }

        let expires_at = if integrity_known {
            record.expires_at.value().copied()
        } else {
            None
        };

        match expires_at {
            Some(expiry) if now < expiry => {
                debug!(
                    expires_at = %expiry,
                    days_left = (expiry - now).num_days(),
                    "license active"
                );
                Ok(LicenseStatus::Active)
            }
            _ => {
                if expires_at.is_none() {
                    warn!("no valid expiry on record, treating as expired");
                }
                if !self.config.server_enabled || !reachability.is_reachable() {
                    self.evaluate_grace_locked(now, &record)
                } else {
                    info!("license expired, reconciliation required");
                    Ok(LicenseStatus::Expired)
                }
            }
        }
    }

    /// Re-derives status through grace evaluation only.
    ///
    /// Used when reconciliation could not reach a verdict (offline, timeout,
    /// undecodable response). If the license was extended in the meantime
    /// the result is `Active` and no grace period is opened.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a grace period had to be opened but could not be
    /// persisted, or `Configuration` if the grace window end is out of range.
    pub fn evaluate_grace(&self, now: DateTime<Utc>) -> LicenseResult<LicenseStatus> {
        let session = self.lock();
        let record = self.records.load();

        if record.activated_at.is_absent() {
            return Ok(LicenseStatus::NotActivated);
        }
        if session.tamper_latched {
            return Ok(LicenseStatus::Tampered);
        }
        if let Some(expiry) = record.expires_at.value()
            && now < *expiry
        {
            return Ok(LicenseStatus::Active);
        }

        self.evaluate_grace_locked(now, &record)
    }

    fn evaluate_grace_locked(
        &self,
        now: DateTime<Utc>,
        record: &StoredRecord,
    ) -> LicenseResult<LicenseStatus> {
        match record.grace_period_started_at {
            Slot::Absent => {
                self.records.write_timestamp(RecordField::GraceStart, now)?;
                info!(
                    grace_hours = self.config.grace_period_hours,
                    "offline grace period started"
                );
                Ok(LicenseStatus::GraceActive)
            }
            Slot::Present(started) => {
                let end = self.grace_end(started)?;
                if now < end {
                    debug!(hours_left = (end - now).num_hours(), "grace period active");
                    Ok(LicenseStatus::GraceActive)
                } else {
                    info!(grace_started_at = %started, "grace period expired");
                    Ok(LicenseStatus::GraceExpired)
                }
            }
            Slot::Corrupt => {
                warn!("grace start unreadable, treating grace period as expired");
                Ok(LicenseStatus::GraceExpired)
            }
        }
    }

    fn grace_end(&self, started: DateTime<Utc>) -> LicenseResult<DateTime<Utc>> {
        started
            .checked_add_signed(self.config.grace_period())
            .ok_or_else(|| overflow("grace_period_hours", self.config.grace_period_hours))
    }

    /// Derives the status `status` would report, without persisting anything.
    ///
    /// Neither the observation nor a grace start is written and no tamper
    /// verdict is latched. Where `status` would open a grace period this
    /// reports `GraceActive`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the grace window end is out of range.
    pub fn peek_status(
        &self,
        now: DateTime<Utc>,
        reachability: Reachability,
    ) -> LicenseResult<LicenseStatus> {
        let session = self.lock();
        let record = self.records.load();

        if record.activated_at.is_absent() {
            return Ok(LicenseStatus::NotActivated);
        }
        if session.tamper_latched {
            return Ok(LicenseStatus::Tampered);
        }

        let integrity_known = !matches!(record.last_observed_at, Slot::Corrupt);
        if integrity_known
            && self.guard.evaluate(now, record.last_observed_at.value().copied())
                == ClockVerdict::Tampered
        {
            return Ok(LicenseStatus::Tampered);
        }

        if integrity_known
            && let Some(expiry) = record.expires_at.value()
            && now < *expiry
        {
            return Ok(LicenseStatus::Active);
        }
        if self.config.server_enabled && reachability.is_reachable() {
            return Ok(LicenseStatus::Expired);
        }

        match record.grace_period_started_at {
            Slot::Absent => Ok(LicenseStatus::GraceActive),
            Slot::Present(started) if now < self.grace_end(started)? => {
                Ok(LicenseStatus::GraceActive)
            }
            Slot::Present(_) | Slot::Corrupt => Ok(LicenseStatus::GraceExpired),
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Grants the first-run trial. Happens exactly once per record lifetime.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyActivated` if the record has ever been activated,
    /// `Configuration` if the trial end is out of range, or `Storage` if the
    /// trial could not be persisted.
    pub fn activate_trial(&self, now: DateTime<Utc>) -> LicenseResult<DateTime<Utc>> {
        let _session = self.lock();
        let record = self.records.load();

        if !record.activated_at.is_absent() {
            return Err(LicenseError::AlreadyActivated);
        }

        let expires_at = now
            .checked_add_signed(self.config.trial())
            .ok_or_else(|| overflow("trial_days", self.config.trial_days))?;
        let device_id = self.device_id_locked(&record)?;

        self.records.write_timestamp(RecordField::ActivationDate, now)?;
        self.records.write_timestamp(RecordField::ExpiryDate, expires_at)?;
        self.records.write_timestamp(RecordField::LastKnownDate, now)?;
        self.records.write_bool(RecordField::ActivationStatus, true)?;
        self.records.clear(RecordField::GraceStart)?;

        info!(
            %device_id,
            trial_days = self.config.trial_days,
            expires_at = %expires_at,
            "trial activated"
        );
        Ok(expires_at)
    }

    /// Extends the license to `now + days`.
    ///
    /// The new expiry is measured from `now`, never from the previous
    /// expiry, so repeated renewals do not stack. Any open grace period is
    /// closed and a latched tamper verdict is cleared. A record that was
    /// never activated is stamped as activated at `now`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidExtension` for non-positive or out-of-range `days`,
    /// or `Storage` if the extension could not be persisted.
    pub fn extend(&self, now: DateTime<Utc>, days: i64) -> LicenseResult<DateTime<Utc>> {
        if days <= 0 {
            return Err(LicenseError::InvalidExtension(days));
        }
        let expires_at = TimeDelta::try_days(days)
            .and_then(|delta| now.checked_add_signed(delta))
            .ok_or(LicenseError::InvalidExtension(days))?;

        let mut session = self.lock();
        let record = self.records.load();

        if record.activated_at.is_absent() {
            self.device_id_locked(&record)?;
            self.records.write_timestamp(RecordField::ActivationDate, now)?;
            self.records.write_bool(RecordField::ActivationStatus, true)?;
        }
        self.records.write_timestamp(RecordField::ExpiryDate, expires_at)?;
        self.records.write_timestamp(RecordField::LastKnownDate, now)?;
        self.records.write_timestamp(RecordField::LastServerCheck, now)?;
        self.records.clear(RecordField::GraceStart)?;
        session.tamper_latched = false;

        info!(days, expires_at = %expires_at, "license extended");
        Ok(expires_at)
    }

    /// Records a successful server contact that carried no new expiry.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the timestamp could not be persisted.
    pub fn mark_server_contact(&self, now: DateTime<Utc>) -> LicenseResult<()> {
        let _session = self.lock();
        self.records.write_timestamp(RecordField::LastServerCheck, now)
    }

    /// Persists the license key a user is trying to redeem.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the key could not be persisted.
    pub fn store_license_key(&self, key: &str) -> LicenseResult<()> {
        let _session = self.lock();
        self.records.write_string(RecordField::LicenseKey, key)?;
        debug!("license key stored");
        Ok(())
    }

    /// Returns the stored license key, if any.
    pub fn license_key(&self) -> Option<String> {
        let _session = self.lock();
        self.records.read_string(RecordField::LicenseKey).value().cloned()
    }

    /// Returns the device identifier, generating and persisting it on first use.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a fresh identifier could not be persisted.
    pub fn device_id(&self) -> LicenseResult<String> {
        let _session = self.lock();
        let record = self.records.load();
        self.device_id_locked(&record)
    }

    fn device_id_locked(&self, record: &StoredRecord) -> LicenseResult<String> {
        if let Slot::Present(id) = &record.device_id
            && !id.is_empty()
        {
            return Ok(id.clone());
        }
        let id = generate_device_id();
        self.records.write_string(RecordField::DeviceId, &id)?;
        info!(device_id = %id, "device identifier generated");
        Ok(id)
    }

    /// Returns a snapshot of the record without modifying it.
    pub fn record(&self) -> LicenseRecord {
        let _session = self.lock();
        self.records.load().snapshot()
    }

    /// Returns true once a tamper verdict has been latched this session.
    pub fn is_tamper_latched(&self) -> bool {
        self.lock().tamper_latched
    }

    /// Wipes every record field, returning the installation to `NotActivated`.
    ///
    /// # Errors
    ///
    /// Returns the first `Storage` error; the remaining fields are still
    /// attempted.
    pub fn reset(&self) -> LicenseResult<()> {
        let mut session = self.lock();
        session.tamper_latched = false;
        self.records.wipe()?;
        warn!("license record wiped");
        Ok(())
    }
}

fn overflow(field: &str, value: impl std::fmt::Display) -> LicenseError {
    LicenseError::Configuration(format!("{field} = {value} is out of range"))
}
