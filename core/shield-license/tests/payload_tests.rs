mod common;

use base64::{engine::general_purpose::STANDARD, Engine};
use common::{sign_payload, test_keypair};
use shield_license::{
    decode_public_key, looks_signed, Ed25519Verifier, LicenseError, SignatureVerifier,
    SignedPayload,
};

// ── Verifier ─────────────────────────────────────────────────────

#[test]
fn verifier_accepts_valid_signature() {
    use ed25519_dalek::Signer;
    let (sk, pk) = test_keypair();
    let sig = sk.sign(b"hello");
    assert!(Ed25519Verifier.verify(b"hello", &sig.to_bytes(), &pk));
}

#[test]
fn verifier_rejects_other_message() {
    use ed25519_dalek::Signer;
    let (sk, pk) = test_keypair();
    let sig = sk.sign(b"hello");
    assert!(!Ed25519Verifier.verify(b"hellO", &sig.to_bytes(), &pk));
}

#[test]
fn verifier_rejects_bad_key_and_signature_lengths() {
    let (_, pk) = test_keypair();
    assert!(!Ed25519Verifier.verify(b"m", &[0u8; 64], &pk[..31]));
    assert!(!Ed25519Verifier.verify(b"m", &[0u8; 10], &pk));
}

// ── Opening payloads ─────────────────────────────────────────────

#[test]
fn open_valid_payload() {
    let (sk, pk) = test_keypair();
    let text = sign_payload(&sk, r#"{"customer":"acme","expiry_days":365}"#);
    let payload = SignedPayload::open(&text, &Ed25519Verifier, &pk).unwrap();
    assert_eq!(payload.get("customer").and_then(|v| v.as_str()), Some("acme"));
    assert_eq!(payload.expiry_days(), Some(365));
    assert_eq!(payload.fields().len(), 2);
}

#[test]
fn open_trims_whitespace() {
    let (sk, pk) = test_keypair();
    let text = sign_payload(&sk, r#"{"a":1}"#);
    assert!(SignedPayload::open(&format!("  {text}\n"), &Ed25519Verifier, &pk).is_ok());
}

#[test]
fn expiry_days_absent_or_non_positive_is_none() {
    let (sk, pk) = test_keypair();
    for json in [r#"{"a":1}"#, r#"{"expiry_days":0}"#, r#"{"expiry_days":"30"}"#] {
        let text = sign_payload(&sk, json);
        let payload = SignedPayload::open(&text, &Ed25519Verifier, &pk).unwrap();
        assert_eq!(payload.expiry_days(), None, "payload {json}");
    }
}

#[test]
fn open_rejects_missing_separator() {
    let (_, pk) = test_keypair();
    let err = SignedPayload::open("no-separator", &Ed25519Verifier, &pk).unwrap_err();
    assert!(matches!(err, LicenseError::InvalidPayloadFormat(_)));
}

#[test]
fn open_rejects_extra_separator() {
    let (_, pk) = test_keypair();
    let err = SignedPayload::open("a|b|c", &Ed25519Verifier, &pk).unwrap_err();
    assert!(matches!(err, LicenseError::InvalidPayloadFormat(_)));
}

#[test]
fn open_rejects_bad_signature_encoding() {
    let (_, pk) = test_keypair();
    let err = SignedPayload::open("{}|!!!", &Ed25519Verifier, &pk).unwrap_err();
    assert!(matches!(err, LicenseError::InvalidPayloadFormat(_)));
}

#[test]
fn open_rejects_tampered_payload() {
    let (sk, pk) = test_keypair();
    let text = sign_payload(&sk, r#"{"expiry_days":30}"#);
    let tampered = text.replacen("30", "3000", 1);
    let err = SignedPayload::open(&tampered, &Ed25519Verifier, &pk).unwrap_err();
    assert!(matches!(err, LicenseError::InvalidSignature));
}

#[test]
fn open_rejects_foreign_key() {
    let (sk, _) = test_keypair();
    let other = ed25519_dalek::SigningKey::from_bytes(&[9u8; 32]);
    let text = sign_payload(&sk, r#"{"a":1}"#);
    let err = SignedPayload::open(&text, &Ed25519Verifier, &other.verifying_key().to_bytes())
        .unwrap_err();
    assert!(matches!(err, LicenseError::InvalidSignature));
}

#[test]
fn payload_is_parsed_only_after_verification() {
    let (sk, pk) = test_keypair();
    // Unsigned garbage must fail on the signature, not on JSON parsing.
    let forged = format!("not json|{}", STANDARD.encode([0u8; 64]));
    assert!(matches!(
        SignedPayload::open(&forged, &Ed25519Verifier, &pk).unwrap_err(),
        LicenseError::InvalidSignature
    ));

    let signed = sign_payload(&sk, "not json");
    assert!(matches!(
        SignedPayload::open(&signed, &Ed25519Verifier, &pk).unwrap_err(),
        LicenseError::InvalidPayload(_)
    ));
}

#[test]
fn open_rejects_non_object_json() {
    let (sk, pk) = test_keypair();
    let text = sign_payload(&sk, "[1,2,3]");
    let err = SignedPayload::open(&text, &Ed25519Verifier, &pk).unwrap_err();
    assert!(matches!(err, LicenseError::InvalidPayload(_)));
}

// ── Helpers ──────────────────────────────────────────────────────

#[test]
fn decode_public_key_ignores_line_breaks() {
    let (_, pk) = test_keypair();
    let encoded = STANDARD.encode(pk);
    let wrapped = format!("{}\n{}", &encoded[..20], &encoded[20..]);
    assert_eq!(decode_public_key(&wrapped).unwrap(), pk.to_vec());
}

#[test]
fn decode_public_key_rejects_garbage() {
    assert!(matches!(
        decode_public_key("***"),
        Err(LicenseError::Configuration(_))
    ));
}

#[test]
fn looks_signed_detects_shape() {
    assert!(looks_signed("{}|c2ln"));
    assert!(!looks_signed("ABCD-EFGH-IJKL"));
    assert!(!looks_signed("a|b|c"));
}
