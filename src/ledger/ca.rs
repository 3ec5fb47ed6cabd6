// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Certificate authority adapter.
//!
//! [`FabricCaClient`] speaks the Fabric CA REST protocol:
//!
//! - `POST /api/v1/enroll` with HTTP basic auth and a PKCS#10 request
//! - `POST /api/v1/register` authorized by a token signed with the registrar key
//!
//! The registrar token is `b64(cert) "." b64(sig)`, where `sig` is an ECDSA
//! signature over `METHOD "." b64(uri) "." b64(body) "." b64(cert)`.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::crypto::{certificate_signing_request, generate_signing_key, sign};
use super::tls::{http_client, https_endpoint};
use super::types::{Enrollment, Identity};

const ENROLL_PATH: &str = "/api/v1/enroll";
const REGISTER_PATH: &str = "/api/v1/register";

/// Error code the CA reports when an identity is already registered.
const CODE_ALREADY_REGISTERED: i64 = 74;

#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("CA client setup failed: {0}")]
    Setup(String),

    #[error("CA request failed: {0}")]
    Protocol(String),

    #[error("CA rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    #[error("Identity {0} is already registered")]
    AlreadyRegistered(String),
}

/// Register/enroll operations against a certificate authority.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Enroll `login` with its secret and return the issued key + certificate.
    async fn enroll(&self, login: &str, secret: &str) -> Result<Enrollment, CaError>;

    /// Register `user_id` under `affiliation` and return its enrollment secret.
    async fn register(
        &self,
        user_id: &str,
        affiliation: &str,
        registrar: &Identity,
    ) -> Result<String, CaError>;
}

#[derive(Serialize)]
struct EnrollRequest<'a> {
    certificate_request: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    identity_type: &'a str,
    affiliation: &'a str,
    secret: &'a str,
    max_enrollments: i32,
}

#[derive(Debug, Deserialize)]
struct CaResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    errors: Vec<CaMessage>,
}

#[derive(Debug, Deserialize)]
struct CaMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl CaResponse {
    fn has_error_code(&self, code: i64) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    fn into_result(self, operation: &'static str, status: StatusCode) -> Result<Self, CaError> {
        if status.is_success() && self.success {
            return Ok(self);
        }
        Err(CaError::Rejected {
            operation,
            message: format!("{status}: {}", self.error_text()),
        })
    }

    fn error_text(&self) -> String {
        if self.errors.is_empty() {
            return "no error detail".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("[{}] {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// HTTP client for a Fabric CA server.
#[derive(Debug, Clone)]
pub struct FabricCaClient {
    base_url: String,
    http: Client,
}

impl FabricCaClient {
    /// Build a client trusting `trust_pem` (when given) for the CA endpoint.
    pub fn new(base_url: &str, trust_pem: Option<&[u8]>, timeout: Duration) -> Result<Self, CaError> {
        let http = http_client(trust_pem, timeout).map_err(|e| CaError::Setup(e.to_string()))?;
        Ok(Self {
            base_url: https_endpoint(base_url),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn read_response(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<(StatusCode, CaResponse), CaError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CaError::Protocol(format!("{operation} response unreadable: {e}")))?;

        let parsed = serde_json::from_str(&body).map_err(|e| {
            CaError::Protocol(format!("{operation} returned {status} with invalid JSON: {e}"))
        })?;
        Ok((status, parsed))
    }
}

#[async_trait]
impl CertificateAuthority for FabricCaClient {
    async fn enroll(&self, login: &str, secret: &str) -> Result<Enrollment, CaError> {
        let signing_key = generate_signing_key();
        let csr = certificate_signing_request(&signing_key, login)
            .map_err(|e| CaError::Protocol(e.to_string()))?;

        let response = self
            .http
            .post(self.url(ENROLL_PATH))
            .basic_auth(login, Some(secret))
            .json(&EnrollRequest {
                certificate_request: &csr,
            })
            .send()
            .await
            .map_err(|e| CaError::Protocol(format!("POST {ENROLL_PATH} failed: {e}")))?;

        let (status, parsed) = Self::read_response("enroll", response).await?;
        let parsed = parsed.into_result("enroll", status)?;
        let certificate_pem = decode_issued_certificate(&parsed.result)?;

        tracing::info!(login = %login, "Enrolled identity with CA");
        Ok(Enrollment::new(signing_key, certificate_pem))
    }

    async fn register(
        &self,
        user_id: &str,
        affiliation: &str,
        registrar: &Identity,
    ) -> Result<String, CaError> {
        let secret = uuid::Uuid::new_v4().to_string();
        let body = serde_json::to_vec(&RegisterRequest {
            id: user_id,
            identity_type: "client",
            affiliation,
            secret: &secret,
            max_enrollments: -1,
        })
        .map_err(|e| CaError::Protocol(format!("serialize register body failed: {e}")))?;

        let token = registrar_token("POST", REGISTER_PATH, &body, registrar);
        let response = self
            .http
            .post(self.url(REGISTER_PATH))
            .header("Authorization", token)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| CaError::Protocol(format!("POST {REGISTER_PATH} failed: {e}")))?;

        let (status, parsed) = Self::read_response("register", response).await?;
        if parsed.has_error_code(CODE_ALREADY_REGISTERED) {
            tracing::debug!(user_id = %user_id, %status, "CA reports identity already registered");
            return Err(CaError::AlreadyRegistered(user_id.to_string()));
        }
        let parsed = parsed.into_result("register", status)?;

        tracing::info!(
            user_id = %user_id,
            affiliation = %affiliation,
            registrar = %registrar.user_id,
            "Registered identity with CA"
        );
        // The CA echoes the secret it accepted; fall back to ours if omitted.
        Ok(parsed
            .result
            .get("secret")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(secret))
    }
}

/// Authorization token for registrar-authenticated CA calls.
pub fn registrar_token(method: &str, uri: &str, body: &[u8], registrar: &Identity) -> String {
    let cert_b64 = Base64::encode_string(registrar.enrollment.certificate_pem().as_bytes());
    let payload = format!(
        "{method}.{}.{}.{cert_b64}",
        Base64::encode_string(uri.as_bytes()),
        Base64::encode_string(body),
    );
    let signature = sign(registrar.enrollment.signing_key(), payload.as_bytes());
    format!("{cert_b64}.{}", Base64::encode_string(&signature))
}

/// The CA returns the issued certificate as base64 of its PEM text.
fn decode_issued_certificate(result: &Value) -> Result<String, CaError> {
    let encoded = result
        .get("Cert")
        .and_then(Value::as_str)
        .ok_or_else(|| CaError::Protocol("enroll response missing Cert".to_string()))?;
    let pem_bytes = Base64::decode_vec(encoded)
        .map_err(|e| CaError::Protocol(format!("enroll Cert is not base64: {e}")))?;
    String::from_utf8(pem_bytes)
        .map_err(|_| CaError::Protocol("enroll Cert is not UTF-8".to_string()))
}
