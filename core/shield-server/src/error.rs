//! Transport error types.

use shield_license::LicenseError;
use thiserror::Error;

/// Result type for server calls.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that keep a server call from producing a response.
///
/// An explicit `success: false` answer is not an error at this layer; it is
/// a decoded [`ServerResponse`](crate::ServerResponse).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("request timed out")]
    Timeout,

    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ServerError {
    /// Classifies a reqwest failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

impl From<ServerError> for LicenseError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Timeout => LicenseError::ServerTimeout,
            ServerError::Unreachable(msg) => LicenseError::NetworkUnavailable(msg),
            ServerError::Decode(msg) => LicenseError::Decode(msg),
            ServerError::InvalidUrl(msg) => LicenseError::Configuration(msg),
            ServerError::Http(e) if e.is_timeout() => LicenseError::ServerTimeout,
            ServerError::Http(e) => LicenseError::NetworkUnavailable(e.to_string()),
        }
    }
}
