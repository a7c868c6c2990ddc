//! Device identifier generation.
//!
//! The identifier is generated once and persisted by the state machine;
//! after that it is read back, never recomputed. Hardware identifiers are
//! hashed when the platform exposes a machine id, otherwise a random UUID
//! is used.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};
use std::env;

/// Generates a fresh opaque device identifier.
#[must_use]
pub fn generate_device_id() -> String {
    match get_machine_id() {
        Some(machine_id) => fingerprint(&[
            env::consts::OS,
            env::consts::ARCH,
            &get_hostname(),
            &machine_id,
        ]),
        None => uuid::Uuid::new_v4().to_string(),
    }
}

/// Hashes identifier components into a compact stable id.
fn fingerprint(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(components.join("|").as_bytes());
    let hash = hasher.finalize();
    URL_SAFE_NO_PAD.encode(&hash[..16])
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Platform machine id, if one exists.
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
