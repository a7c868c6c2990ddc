//! Allow/deny verdicts handed to the host.

use serde::Serialize;
use std::fmt;

/// Final decision of a license check or activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny(DenialReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The denial reason, if denied.
    pub fn denial(&self) -> Option<&DenialReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(reason),
        }
    }
}

/// Why the protected application may not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Clock manipulation detected.
    Tampered,
    /// Expired with no licensing server to renew against.
    Expired,
    /// Expired and the offline grace window is used up.
    GraceExpired,
    /// The server explicitly refused the license or key.
    Rejected(String),
    /// Activation could not reach a verdict with the server.
    Unreachable(String),
    /// The license record could not be read or written.
    Storage(String),
}

impl DenialReason {
    /// The single user-facing message for this denial.
    pub fn message(&self) -> String {
        match self {
            Self::Tampered => {
                "System date manipulation detected. Restore the correct date and time.".to_string()
            }
            Self::Expired => "License expired. Please renew your license.".to_string(),
            Self::GraceExpired => {
                "License expired and the licensing server could not be reached.".to_string()
            }
            Self::Rejected(reason) => format!("License invalid: {reason}. Please contact support."),
            Self::Unreachable(_) => {
                "Could not reach the licensing server. Please try again later.".to_string()
            }
            Self::Storage(_) => "License data could not be read or saved.".to_string(),
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
