//! Shared test helpers for license tests.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use shield_license::{LicenseConfig, LicenseStateMachine, MemoryStore};
use std::sync::Arc;

/// A fixed starting instant for deterministic tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

/// Offline-by-design configuration (no server).
pub fn offline_config() -> LicenseConfig {
    LicenseConfig::default()
}

/// Configuration with a licensing server.
pub fn server_config() -> LicenseConfig {
    LicenseConfig {
        server_enabled: true,
        server_url: "https://licenses.example.com/api".to_string(),
        ..Default::default()
    }
}

/// Builds a state machine over a fresh in-memory store.
pub fn machine_with(config: LicenseConfig) -> (LicenseStateMachine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let machine = LicenseStateMachine::new(config, store.clone());
    (machine, store)
}

/// Returns a deterministic Ed25519 key pair from a fixed seed.
pub fn test_keypair() -> (SigningKey, [u8; 32]) {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key.to_bytes())
}

/// Creates a signed payload string: `payload|base64(signature)`.
pub fn sign_payload(signing_key: &SigningKey, payload_json: &str) -> String {
    let signature = signing_key.sign(payload_json.as_bytes());
    let sig_b64 = STANDARD.encode(signature.to_bytes());
    format!("{payload_json}|{sig_b64}")
}
