//! Wiring for the `shield` command-line tool.

use anyhow::{Context, Result};
use shield_gate::{LicenseGate, ManualConnectivity};
use shield_license::{
    decode_public_key, CredentialStore, Ed25519Verifier, FileStore, LicenseConfig, Reachability,
    SignedPayload,
};
use shield_server::HttpLicenseServer;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Loads the configuration from `path`, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<LicenseConfig> {
    let config = match path {
        Some(path) => LicenseConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => LicenseConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Opens the file-backed credential store at `path`, or the per-user default.
pub fn open_store(path: Option<&Path>) -> Result<Arc<FileStore>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => FileStore::default_path().context("resolving default store path")?,
    };
    debug!(path = %path.display(), "using credential store");
    Ok(Arc::new(FileStore::new(path)))
}

/// Builds a gate with the HTTP server client when the configuration has one.
pub fn build_gate(
    config: LicenseConfig,
    store: Arc<dyn CredentialStore>,
    reachability: Reachability,
) -> Result<LicenseGate> {
    let mut builder = LicenseGate::builder(config.clone())
        .store(store)
        .connectivity(Arc::new(ManualConnectivity::new(reachability)));
    if config.server_enabled {
        let server = HttpLicenseServer::new(&config).context("creating server client")?;
        builder = builder.server(Arc::new(server));
    }
    builder.build().context("building license gate")
}

/// Verifies a signed payload against the configured public key.
pub fn open_payload(config: &LicenseConfig, text: &str) -> Result<SignedPayload> {
    let encoded = config
        .public_key
        .as_deref()
        .context("no public_key configured")?;
    let public_key = decode_public_key(encoded)?;
    let payload = SignedPayload::open(text, &Ed25519Verifier, &public_key)?;
    Ok(payload)
}
