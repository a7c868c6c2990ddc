//! The persisted license record.
//!
//! Each field lives under its own credential-store key
//! (`<namespace>_<field>`), timestamps as RFC 3339 strings. Reads keep
//! "absent" and "present but unreadable" apart so callers can fail closed
//! on corruption instead of treating it as a fresh install.

use crate::error::LicenseResult;
use crate::store::CredentialStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A single persisted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    ActivationStatus,
    ActivationDate,
    ExpiryDate,
    DeviceId,
    LicenseKey,
    LastServerCheck,
    LastKnownDate,
    GraceStart,
}

impl RecordField {
    /// Every field, in wipe order.
    pub const ALL: [RecordField; 8] = [
        RecordField::ActivationStatus,
        RecordField::ActivationDate,
        RecordField::ExpiryDate,
        RecordField::DeviceId,
        RecordField::LicenseKey,
        RecordField::LastServerCheck,
        RecordField::LastKnownDate,
        RecordField::GraceStart,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Self::ActivationStatus => "activation_status",
            Self::ActivationDate => "activation_date",
            Self::ExpiryDate => "expiry_date",
            Self::DeviceId => "device_id",
            Self::LicenseKey => "license_key",
            Self::LastServerCheck => "last_server_check",
            Self::LastKnownDate => "last_known_date",
            Self::GraceStart => "grace_start",
        }
    }

    /// Store key for this field under `namespace`.
    #[must_use]
    pub fn key(self, namespace: &str) -> String {
        format!("{namespace}_{}", self.suffix())
    }
}

/// Result of reading one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot<T> {
    Absent,
    Present(T),
    /// The key exists (or the read failed) but no value could be decoded.
    Corrupt,
}

impl<T> Slot<T> {
    pub(crate) fn is_absent(&self) -> bool {
        matches!(self, Slot::Absent)
    }

    pub(crate) fn value(&self) -> Option<&T> {
        match self {
            Slot::Present(v) => Some(v),
            _ => None,
        }
    }
}

/// Snapshot of the license record.
///
/// Unreadable fields appear as `None` here; the state machine works on the
/// raw slots and never mistakes them for absent ones.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct LicenseRecord {
    pub device_id: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_observed_at: Option<DateTime<Utc>>,
    pub grace_period_started_at: Option<DateTime<Utc>>,
    pub last_server_contact_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub license_key: Option<String>,
    pub activated: bool,
}

impl fmt::Debug for LicenseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseRecord")
            .field("device_id", &self.device_id)
            .field("activated_at", &self.activated_at)
            .field("expires_at", &self.expires_at)
            .field("last_observed_at", &self.last_observed_at)
            .field("grace_period_started_at", &self.grace_period_started_at)
            .field("last_server_contact_at", &self.last_server_contact_at)
            .field("has_license_key", &self.license_key.is_some())
            .field("activated", &self.activated)
            .finish()
    }
}

/// The record as read from the store, slot by slot.
#[derive(Debug, Clone)]
pub(crate) struct StoredRecord {
    pub device_id: Slot<String>,
    pub activated_at: Slot<DateTime<Utc>>,
    pub expires_at: Slot<DateTime<Utc>>,
    pub last_observed_at: Slot<DateTime<Utc>>,
    pub grace_period_started_at: Slot<DateTime<Utc>>,
    pub last_server_contact_at: Slot<DateTime<Utc>>,
    pub license_key: Slot<String>,
    pub activated: Slot<bool>,
}

impl StoredRecord {
    pub(crate) fn snapshot(&self) -> LicenseRecord {
        LicenseRecord {
            device_id: self.device_id.value().cloned(),
            activated_at: self.activated_at.value().copied(),
            expires_at: self.expires_at.value().copied(),
            last_observed_at: self.last_observed_at.value().copied(),
            grace_period_started_at: self.grace_period_started_at.value().copied(),
            last_server_contact_at: self.last_server_contact_at.value().copied(),
            license_key: self.license_key.value().cloned(),
            activated: self.activated.value().copied().unwrap_or(false),
        }
    }
}

/// Field-level access to the record in a credential store.
pub(crate) struct RecordStore {
    store: Arc<dyn CredentialStore>,
    namespace: String,
}

impl RecordStore {
    pub(crate) fn new(store: Arc<dyn CredentialStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub(crate) fn load(&self) -> StoredRecord {
        StoredRecord {
            device_id: self.read_string(RecordField::DeviceId),
            activated_at: self.read_timestamp(RecordField::ActivationDate),
            expires_at: self.read_timestamp(RecordField::ExpiryDate),
            last_observed_at: self.read_timestamp(RecordField::LastKnownDate),
            grace_period_started_at: self.read_timestamp(RecordField::GraceStart),
            last_server_contact_at: self.read_timestamp(RecordField::LastServerCheck),
            license_key: self.read_string(RecordField::LicenseKey),
            activated: match self.read_string(RecordField::ActivationStatus) {
                Slot::Present(v) => Slot::Present(v == "1"),
                Slot::Absent => Slot::Absent,
                Slot::Corrupt => Slot::Corrupt,
            },
        }
    }

    fn read_raw(&self, field: RecordField) -> Slot<Vec<u8>> {
        match self.store.get(&field.key(&self.namespace)) {
            Ok(Some(bytes)) => Slot::Present(bytes),
            Ok(None) => Slot::Absent,
            Err(e) => {
                warn!(field = ?field, error = %e, "record read failed");
                Slot::Corrupt
            }
        }
    }

    pub(crate) fn read_string(&self, field: RecordField) -> Slot<String> {
        match self.read_raw(field) {
            Slot::Present(bytes) => match String::from_utf8(bytes) {
                Ok(s) => Slot::Present(s),
                Err(_) => {
                    warn!(field = ?field, "record field is not UTF-8");
                    Slot::Corrupt
                }
            },
            Slot::Absent => Slot::Absent,
            Slot::Corrupt => Slot::Corrupt,
        }
    }

    pub(crate) fn read_timestamp(&self, field: RecordField) -> Slot<DateTime<Utc>> {
        match self.read_string(field) {
            Slot::Present(s) => match DateTime::parse_from_rfc3339(s.trim()) {
                Ok(ts) => Slot::Present(ts.with_timezone(&Utc)),
                Err(e) => {
                    warn!(field = ?field, error = %e, "record timestamp unreadable");
                    Slot::Corrupt
                }
            },
            Slot::Absent => Slot::Absent,
            Slot::Corrupt => Slot::Corrupt,
        }
    }

    pub(crate) fn write_string(&self, field: RecordField, value: &str) -> LicenseResult<()> {
        self.store.set(&field.key(&self.namespace), value.as_bytes())
    }

    pub(crate) fn write_timestamp(&self, field: RecordField, value: DateTime<Utc>) -> LicenseResult<()> {
        self.write_string(field, &value.to_rfc3339())
    }

    pub(crate) fn write_bool(&self, field: RecordField, value: bool) -> LicenseResult<()> {
        self.write_string(field, if value { "1" } else { "0" })
    }

    pub(crate) fn clear(&self, field: RecordField) -> LicenseResult<()> {
        self.store.delete(&field.key(&self.namespace))
    }

    /// Deletes every field. Keeps going past failures and reports the first.
    pub(crate) fn wipe(&self) -> LicenseResult<()> {
        let mut first_error = None;
        for field in RecordField::ALL {
            if let Err(e) = self.clear(field) {
                warn!(field = ?field, error = %e, "record wipe failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
