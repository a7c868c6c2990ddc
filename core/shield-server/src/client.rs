//! HTTP client for the licensing server.

use crate::error::{ServerError, ServerResult};
use crate::protocol::{ACTIVATE_PATH, APP_ID_HEADER, ServerRequest, ServerResponse, VERIFY_PATH};
use async_trait::async_trait;
use reqwest::{Client, Url};
use shield_license::LicenseConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// Licensing server endpoints.
///
/// Implementations return `Ok` for any decodable answer, including an
/// explicit `success: false`; `Err` means no usable answer arrived.
#[async_trait]
pub trait LicenseServer: Send + Sync {
    /// Redeems a license key (`POST /activate`).
    async fn activate(&self, request: ServerRequest) -> ServerResult<ServerResponse>;

    /// Checks the current license (`POST /verify`).
    async fn verify(&self, request: ServerRequest) -> ServerResult<ServerResponse>;
}

/// reqwest-backed [`LicenseServer`].
pub struct HttpLicenseServer {
    client: Client,
    base_url: String,
    app_id: String,
}

impl HttpLicenseServer {
    /// Creates a client from the gate configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if `server_url` does not parse, or `Http` if the
    /// TLS backend cannot be initialized.
    pub fn new(config: &LicenseConfig) -> ServerResult<Self> {
        Self::with_timeout(&config.server_url, &config.app_id, config.request_timeout())
    }

    /// Creates a client for `base_url` with an explicit per-request timeout.
    ///
    /// # Errors
    ///
    /// Same as [`HttpLicenseServer::new`].
    pub fn with_timeout(base_url: &str, app_id: &str, timeout: Duration) -> ServerResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| ServerError::InvalidUrl(format!("{base_url}: {e}")))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            app_id: app_id.to_string(),
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, request: &ServerRequest) -> ServerResult<ServerResponse> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, request_id = %request.request_id, "license server request");

        let response = self
            .client
            .post(&url)
            .header(APP_ID_HEADER, &self.app_id)
            .json(request)
            .send()
            .await
            .map_err(ServerError::from_transport)?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(ServerError::from_transport)?;

        match serde_json::from_slice::<ServerResponse>(&body) {
            Ok(decoded) if decoded.success && !status.is_success() => Err(ServerError::Decode(
                format!("success body with HTTP {status}"),
            )),
            Ok(decoded) => {
                debug!(
                    %status,
                    success = decoded.success,
                    expiry_days = ?decoded.expiry_days,
                    "license server response"
                );
                Ok(decoded)
            }
            Err(e) if status.is_server_error() => {
                warn!(%status, "license server error without a response body");
                Err(ServerError::Unreachable(format!("HTTP {status}: {e}")))
            }
            Err(e) => Err(ServerError::Decode(format!("HTTP {status}: {e}"))),
        }
    }
}

#[async_trait]
impl LicenseServer for HttpLicenseServer {
    async fn activate(&self, request: ServerRequest) -> ServerResult<ServerResponse> {
        self.post(ACTIVATE_PATH, &request).await
    }

    async fn verify(&self, request: ServerRequest) -> ServerResult<ServerResponse> {
        self.post(VERIFY_PATH, &request).await
    }
}
