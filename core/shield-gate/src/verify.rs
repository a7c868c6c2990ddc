//! One verification round trip, applied to the record.
//!
//! Shared by startup reconciliation, the heartbeat and the
//! connectivity watcher. The response is applied here, so a caller that
//! stopped waiting still gets the record updated.

use chrono::{DateTime, Utc};
use shield_license::{Clock, LicenseError, LicenseStateMachine};
use shield_server::{LicenseServer, ServerRequest};
use tracing::{debug, info, warn};

/// What a verification round trip established.
#[derive(Debug)]
pub(crate) enum VerifyOutcome {
    /// The server confirmed the license. `expires_at` is set when it also
    /// granted an extension.
    Confirmed { expires_at: Option<DateTime<Utc>> },
    /// The server explicitly refused.
    Rejected(String),
    /// No verdict: transport failure, timeout or undecodable reply.
    Unresolved(LicenseError),
}

pub(crate) async fn verify_and_apply(
    server: &dyn LicenseServer,
    machine: &LicenseStateMachine,
    clock: &dyn Clock,
) -> VerifyOutcome {
    let device_id = match machine.device_id() {
        Ok(id) => id,
        Err(e) => return VerifyOutcome::Unresolved(e),
    };
    let config = machine.config();
    let request = ServerRequest::verify(
        device_id,
        config.app_id.as_str(),
        config.bundle_id.as_str(),
        clock.now(),
    );
    let request_id = request.request_id.clone();
    debug!(%request_id, "verifying license with server");

    let response = match server.verify(request).await {
        Ok(response) => response,
        Err(e) => {
            let error = LicenseError::from(e);
            debug!(%request_id, error = %error, "verification unresolved");
            return VerifyOutcome::Unresolved(error);
        }
    };

    if !response.success {
        warn!(%request_id, reason = response.reason(), "server rejected license");
        return VerifyOutcome::Rejected(response.reason().to_string());
    }

    // The clock is read again: the round trip may have taken a while.
    let now = clock.now();
    match response.requested_extension() {
        Some(days) => match machine.extend(now, days) {
            Ok(expires_at) => {
                info!(%request_id, days, "license renewed by server");
                VerifyOutcome::Confirmed {
                    expires_at: Some(expires_at),
                }
            }
            Err(e) => {
                warn!(%request_id, error = %e, "failed to apply server extension");
                VerifyOutcome::Unresolved(e)
            }
        },
        None => {
            if let Err(e) = machine.mark_server_contact(now) {
                warn!(%request_id, error = %e, "failed to record server contact");
            }
            debug!(%request_id, "license confirmed without extension");
            VerifyOutcome::Confirmed { expires_at: None }
        }
    }
}
