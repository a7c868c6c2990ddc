//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Wall-clock movement between two checks was implausible.
    #[error("clock tampering detected")]
    TamperDetected,

    /// The licensing server could not be reached.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The server answered with an explicit failure.
    #[error("server rejected license: {0}")]
    ServerRejected(String),

    /// The server did not answer in time.
    #[error("server request timed out")]
    ServerTimeout,

    /// The server answered with a body that could not be decoded.
    #[error("malformed server response: {0}")]
    Decode(String),

    /// The persisted record is missing, corrupt, or could not be written.
    #[error("storage error: {0}")]
    Storage(String),

    /// The gate was configured in a way it cannot operate with.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Trial activation was requested on an already activated record.
    #[error("license already activated")]
    AlreadyActivated,

    /// Extension by a non-positive number of days.
    #[error("invalid extension: {0} days")]
    InvalidExtension(i64),

    /// Signed payload is not `payload|signature`.
    #[error("invalid signed payload format: {0}")]
    InvalidPayloadFormat(String),

    /// Signature verification failed.
    #[error("payload signature invalid")]
    InvalidSignature,

    /// Payload verified but is not a JSON object.
    #[error("invalid license payload: {0}")]
    InvalidPayload(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Returns true for the errors that leave connectivity unresolved.
    ///
    /// These degrade to grace-period evaluation instead of denying.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable(_) | Self::ServerTimeout | Self::Decode(_)
        )
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
