//! Startup license gate.
//!
//! Ties the local license state machine to a licensing server:
//! - [`LicenseGate`]: the single startup check the host calls
//! - [`ReconciliationOrchestrator`]: bounded-time resolution of an expired license
//! - [`HeartbeatScheduler`]: periodic background verification
//! - [`ConnectivityWatcher`]: verification when the network comes back
//! - [`ActivationFlow`]: license key redemption
//!
//! # Guarantees
//!
//! - `check_license` returns within the reconciliation deadline plus local
//!   work, whatever the server does
//! - A server answer that arrives after the deadline is still applied
//! - Once a check denies, background verification stops before the verdict
//!   is returned and the gate stays locked

mod activation;
mod connectivity;
mod gate;
mod heartbeat;
mod orchestrator;
mod verdict;
mod verify;
mod watcher;

pub use activation::ActivationFlow;
pub use connectivity::{ConnectivityMonitor, ManualConnectivity};
pub use gate::{LicenseGate, LicenseGateBuilder, LicenseInfo};
pub use heartbeat::HeartbeatScheduler;
pub use orchestrator::ReconciliationOrchestrator;
pub use verdict::{DenialReason, Verdict};
pub use watcher::ConnectivityWatcher;

pub use shield_license::{LicenseConfig, LicenseStatus, Reachability};
