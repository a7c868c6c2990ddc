//! Wire protocol for the licensing server.
//!
//! Both endpoints (`POST /activate`, `POST /verify`) take the same
//! snake_case JSON body and answer with [`ServerResponse`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path of the activation endpoint.
pub const ACTIVATE_PATH: &str = "/activate";
/// Path of the verification endpoint.
pub const VERIFY_PATH: &str = "/verify";
/// Header carrying the application id.
pub const APP_ID_HEADER: &str = "X-App-ID";

/// Request body for both endpoints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRequest {
    /// Fresh id per request.
    pub request_id: String,
    pub device_id: String,
    pub app_id: String,
    pub bundle_id: String,
    /// Present only on activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    /// RFC 3339 client time.
    pub timestamp: String,
}

impl ServerRequest {
    /// Builds a verification request.
    pub fn verify(
        device_id: impl Into<String>,
        app_id: impl Into<String>,
        bundle_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.into(),
            app_id: app_id.into(),
            bundle_id: bundle_id.into(),
            license_key: None,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Builds an activation request for `license_key`.
    pub fn activate(
        device_id: impl Into<String>,
        app_id: impl Into<String>,
        bundle_id: impl Into<String>,
        license_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            license_key: Some(license_key.into()),
            ..Self::verify(device_id, app_id, bundle_id, now)
        }
    }
}

impl fmt::Debug for ServerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRequest")
            .field("request_id", &self.request_id)
            .field("device_id", &self.device_id)
            .field("app_id", &self.app_id)
            .field("bundle_id", &self.bundle_id)
            .field("has_license_key", &self.license_key.is_some())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Response body from both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// New license length; absent means no change requested.
    #[serde(default)]
    pub expiry_days: Option<i64>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl ServerResponse {
    /// A successful response.
    pub fn ok(expiry_days: Option<i64>) -> Self {
        Self {
            success: true,
            message: None,
            expiry_days,
            signature: None,
        }
    }

    /// An explicit failure.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            expiry_days: None,
            signature: None,
        }
    }

    /// Extension requested by the server, if any (non-positive means none).
    pub fn requested_extension(&self) -> Option<i64> {
        self.expiry_days.filter(|days| *days > 0)
    }

    /// Message for logs and denial reasons.
    pub fn reason(&self) -> &str {
        self.message.as_deref().unwrap_or("no reason given")
    }
}
