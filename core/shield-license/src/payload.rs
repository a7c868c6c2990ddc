//! Signed license payload verification.
//!
//! Payloads use the format: `payload|base64(signature)`
//!
//! The signature covers the raw payload bytes. The payload is parsed as a
//! JSON object only after the signature verifies. The verifying key is
//! public and shipped with the application; the signing key stays on the
//! server.

use crate::error::{LicenseError, LicenseResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::{Map, Value};

/// Separator between payload and signature.
pub const PAYLOAD_SEPARATOR: char = '|';

/// Asymmetric signature check.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true if `signature` is valid for `message` under `public_key`.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;
}

/// Ed25519 verifier (32-byte public keys, 64-byte signatures).
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify(message, &signature).is_ok()
    }
}

/// Decodes a base64 public key as configured.
///
/// # Errors
///
/// Returns `Configuration` if the value is not valid base64.
pub fn decode_public_key(encoded: &str) -> LicenseResult<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|e| LicenseError::Configuration(format!("invalid public key base64: {e}")))
}

/// Returns true if `text` has the shape of a signed payload.
#[must_use]
pub fn looks_signed(text: &str) -> bool {
    text.trim().split(PAYLOAD_SEPARATOR).count() == 2
}

/// A verified payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedPayload {
    fields: Map<String, Value>,
}

impl SignedPayload {
    /// Verifies and parses a `payload|signature` string.
    ///
    /// # Errors
    ///
    /// `InvalidPayloadFormat` for a malformed string or signature encoding,
    /// `InvalidSignature` if verification fails, `InvalidPayload` if the
    /// verified payload is not a JSON object.
    pub fn open(
        text: &str,
        verifier: &dyn SignatureVerifier,
        public_key: &[u8],
    ) -> LicenseResult<Self> {
        let text = text.trim();

        let parts: Vec<&str> = text.split(PAYLOAD_SEPARATOR).collect();
        if parts.len() != 2 {
            return Err(LicenseError::InvalidPayloadFormat(
                "expected exactly two parts separated by '|'".to_string(),
            ));
        }
        let (payload, signature_b64) = (parts[0], parts[1]);

        let signature = BASE64.decode(signature_b64).map_err(|e| {
            LicenseError::InvalidPayloadFormat(format!("invalid signature base64: {e}"))
        })?;

        if !verifier.verify(payload.as_bytes(), &signature, public_key) {
            return Err(LicenseError::InvalidSignature);
        }

        let value: Value = serde_json::from_str(payload)
            .map_err(|e| LicenseError::InvalidPayload(format!("invalid payload JSON: {e}")))?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(LicenseError::InvalidPayload(format!(
                "expected JSON object, got {other}"
            ))),
        }
    }

    /// All payload fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Looks up one field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// License length granted by the payload, if it carries a positive one.
    #[must_use]
    pub fn expiry_days(&self) -> Option<i64> {
        self.fields
            .get("expiry_days")
            .and_then(Value::as_i64)
            .filter(|days| *days > 0)
    }
}
