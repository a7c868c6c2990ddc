//! License status and network reachability values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The current status of a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// No record yet; the first check grants the trial.
    NotActivated,
    /// Valid and unexpired.
    Active,
    /// Past expiry with the server reachable; must be reconciled.
    Expired,
    /// Past expiry, offline (or no server), inside the grace window.
    GraceActive,
    /// Past expiry and past the grace window.
    GraceExpired,
    /// Implausible clock movement was observed.
    Tampered,
}

impl LicenseStatus {
    /// Returns true if the protected application may run on this status alone.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Active | Self::GraceActive)
    }

    /// Returns true for the statuses that only an extension can leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Tampered | Self::GraceExpired)
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotActivated => "not_activated",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::GraceActive => "grace_active",
            Self::GraceExpired => "grace_expired",
            Self::Tampered => "tampered",
        };
        f.write_str(name)
    }
}

/// Network reachability as reported by the connectivity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reachability {
    None,
    Limited,
    Full,
}

impl Reachability {
    /// Anything but `None` counts as reachable.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        !matches!(self, Self::None)
    }
}
