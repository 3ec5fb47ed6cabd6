// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key material handling for ledger identities.
//!
//! Ledger MSP identities use NIST P-256 ECDSA. Private keys are persisted as
//! base64 text of their PKCS#8 DER encoding; PKCS#8 PEM is also accepted on
//! read so keys exported by other tooling can be dropped into the bucket.

use std::str::FromStr;

use base64ct::{Base64, Encoding};
use p256::ecdsa::{signature::Signer, DerSignature, Signature, SigningKey};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use x509_cert::builder::{Builder, RequestBuilder};
use x509_cert::der::{pem::LineEnding, EncodePem};
use x509_cert::name::Name;

/// Size of the random nonce bound into every proposal.
pub const NONCE_LEN: usize = 24;

/// Errors raised while handling key material.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Failed to build certificate request: {0}")]
    CertificateRequest(String),
}

/// Generate a fresh P-256 signing key.
pub fn generate_signing_key() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

/// PKCS#8 DER encoding of a signing key.
pub fn private_key_der(key: &SigningKey) -> Result<Vec<u8>, CryptoError> {
    key.to_pkcs8_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

/// Base64 text form written to the credential store.
pub fn encode_private_key(key: &SigningKey) -> Result<String, CryptoError> {
    Ok(Base64::encode_string(&private_key_der(key)?))
}

/// Parse a stored private key (base64 PKCS#8 DER, or PKCS#8 PEM).
pub fn decode_private_key(stored: &[u8]) -> Result<SigningKey, CryptoError> {
    let text = std::str::from_utf8(stored)
        .map_err(|e| CryptoError::InvalidPrivateKey(format!("Invalid UTF-8: {e}")))?
        .trim();

    if text.starts_with("-----BEGIN") {
        return SigningKey::from_pkcs8_pem(text)
            .map_err(|e| CryptoError::InvalidPrivateKey(format!("Invalid PEM: {e}")));
    }

    let der = Base64::decode_vec(text)
        .map_err(|e| CryptoError::InvalidPrivateKey(format!("Invalid base64: {e}")))?;
    SigningKey::from_pkcs8_der(&der)
        .map_err(|e| CryptoError::InvalidPrivateKey(format!("Invalid key format: {e}")))
}

/// ECDSA-SHA256 signature, low-S normalized, DER encoded.
///
/// The ledger rejects high-S signatures.
pub fn sign(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let signature: Signature = key.sign(message);
    let signature = signature.normalize_s().unwrap_or(signature);
    signature.to_der().as_bytes().to_vec()
}

/// Fresh random proposal nonce.
pub fn new_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Transaction id: hex(SHA-256(nonce || creator certificate)).
pub fn transaction_id(nonce: &[u8], creator_certificate: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(creator_certificate);
    hex::encode(hasher.finalize())
}

/// PKCS#10 request for `common_name`, signed with `key`, PEM encoded.
pub fn certificate_signing_request(
    key: &SigningKey,
    common_name: &str,
) -> Result<String, CryptoError> {
    let subject = Name::from_str(&format!("CN={}", escape_dn_value(common_name)))
        .map_err(|e| CryptoError::CertificateRequest(format!("Invalid subject: {e}")))?;

    let builder = RequestBuilder::new(subject, key)
        .map_err(|e| CryptoError::CertificateRequest(e.to_string()))?;
    let request = builder
        .build::<DerSignature>()
        .map_err(|e| CryptoError::CertificateRequest(e.to_string()))?;

    request
        .to_pem(LineEnding::LF)
        .map_err(|e| CryptoError::CertificateRequest(e.to_string()))
}

/// Self-signed CA certificate for `common_name`, PEM encoded.
#[cfg(test)]
pub(crate) fn self_signed_certificate(common_name: &str) -> String {
    use std::time::Duration;
    use x509_cert::builder::{CertificateBuilder, Profile};
    use x509_cert::serial_number::SerialNumber;
    use x509_cert::spki::SubjectPublicKeyInfoOwned;
    use x509_cert::time::Validity;

    let key = generate_signing_key();
    let subject = Name::from_str(&format!("CN={}", escape_dn_value(common_name))).unwrap();
    let public_key = SubjectPublicKeyInfoOwned::from_key(*key.verifying_key()).unwrap();
    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(1u32),
        Validity::from_now(Duration::from_secs(3600)).unwrap(),
        subject,
        public_key,
        &key,
    )
    .unwrap();
    builder
        .build::<DerSignature>()
        .unwrap()
        .to_pem(LineEnding::LF)
        .unwrap()
}

/// Escape an attribute value for an RFC 4514 distinguished name.
fn escape_dn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == '#' || c == ' ');
        let trailing = i + 1 == value.chars().count() && c == ' ';
        if leading || trailing || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Verifier, VerifyingKey};

    #[test]
    fn private_key_round_trips_through_base64() {
        let key = generate_signing_key();
        let encoded = encode_private_key(&key).unwrap();
        let decoded = decode_private_key(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(private_key_der(&decoded).unwrap(), private_key_der(&key).unwrap());
    }

    #[test]
    fn decode_accepts_pkcs8_pem_and_surrounding_whitespace() {
        let key = generate_signing_key();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        assert_eq!(decode_private_key(pem.as_bytes()).unwrap(), key);

        let padded = format!("  {}\n", encode_private_key(&key).unwrap());
        assert_eq!(decode_private_key(padded.as_bytes()).unwrap(), key);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_private_key(b"not a key"),
            Err(CryptoError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn signatures_verify_and_are_low_s() {
        let key = generate_signing_key();
        let der = sign(&key, b"proposal bytes");
        let signature = Signature::from_der(&der).unwrap();
        assert!(signature.normalize_s().is_none(), "signature must already be low-S");

        let verifying_key = VerifyingKey::from(&key);
        verifying_key.verify(b"proposal bytes", &signature).unwrap();
    }

    #[test]
    fn transaction_id_is_hex_sha256() {
        let id = transaction_id(b"nonce", b"cert");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, transaction_id(b"other", b"cert"));
    }

    #[test]
    fn nonces_differ() {
        assert_ne!(new_nonce(), new_nonce());
    }

    #[test]
    fn csr_is_pem_encoded() {
        let key = generate_signing_key();
        let csr = certificate_signing_request(&key, "alice@example.com").unwrap();
        assert!(csr.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
    }

    #[test]
    fn self_signed_certificate_is_pem() {
        let pem = self_signed_certificate("test-ca");
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn dn_values_are_escaped() {
        assert_eq!(escape_dn_value("a,b"), "a\\,b");
        assert_eq!(escape_dn_value("#x"), "\\#x");
        assert_eq!(escape_dn_value("plain"), "plain");
    }
}
