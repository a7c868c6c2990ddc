//! Offline-capable license gate core.
//!
//! This crate holds everything that can be decided locally:
//! - The persisted license record and its credential-store layout
//! - The clock integrity guard (anti-tamper)
//! - The license validity state machine (trial, expiry, offline grace)
//! - Signed payload verification with Ed25519
//! - Gate configuration and the error taxonomy
//!
//! # Design Principles
//!
//! - **Single writer**: only [`LicenseStateMachine`] mutates the record, and
//!   each transition runs in one critical section
//! - **Fail closed**: an unreadable record never re-grants a trial or a grace period
//! - **Bounded offline use**: an expired installation runs offline for at most
//!   the grace window
//! - **Injected collaborators**: store, clock and verifier are passed in
//!
//! # Status Flow
//!
//! `NotActivated → Active → Expired → (reconciled) Active`, or offline
//! `Active → GraceActive → GraceExpired`. `Tampered` and `GraceExpired`
//! are left only by an extension.

mod clock;
mod config;
mod device;
mod error;
mod machine;
mod payload;
mod record;
mod status;
mod store;

pub use clock::{Clock, ClockIntegrityGuard, ClockVerdict, ManualClock, SystemClock};
pub use config::{
    LicenseConfig, MAX_GRACE_PERIOD_HOURS, MAX_HEARTBEAT_INTERVAL_SECS, MAX_TRIAL_DAYS,
};
pub use device::generate_device_id;
pub use error::{LicenseError, LicenseResult};
pub use machine::LicenseStateMachine;
pub use payload::{
    decode_public_key, looks_signed, Ed25519Verifier, SignatureVerifier, SignedPayload,
    PAYLOAD_SEPARATOR,
};
pub use record::{LicenseRecord, RecordField};
pub use status::{LicenseStatus, Reachability};
pub use store::{CredentialStore, FileStore, MemoryStore};
