//! Licensing server protocol and client.
//!
//! - [`LicenseServer`]: the async seam the gate talks to
//! - [`HttpLicenseServer`]: reqwest implementation with a per-request timeout
//! - [`ServerRequest`] / [`ServerResponse`]: the JSON wire format
//!
//! The transport timeout here is independent of the gate's reconciliation
//! deadline; the gate decides on its own clock and may ignore a response
//! that is still in flight.

mod client;
mod error;
mod protocol;

pub use client::{HttpLicenseServer, LicenseServer};
pub use error::{ServerError, ServerResult};
pub use protocol::{
    ServerRequest, ServerResponse, ACTIVATE_PATH, APP_ID_HEADER, VERIFY_PATH,
};
