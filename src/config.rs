// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded once from the environment at startup into an
//! immutable [`GatewayConfig`], then shared through `Arc`. Values are opaque
//! strings checked for presence; only timeouts, ports and enumerations are parsed.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CHAINCODE_ID` | Chaincode name | Required |
//! | `CHAINCODE_QUERY_FUNCTION` | Function evaluated by `/api/query` | Required |
//! | `CHAINCODE_INVOKE_FUNCTION` | Function invoked by `/api/submit/commodity` | Required |
//! | `AWS_REGION` | Region of the managed network and identity provider | Required |
//! | `NETWORK_ID` | Network id (also the orderer id) | Required |
//! | `CHANNEL_ID` | Channel name | Required |
//! | `LEDGER_TLS_CERT_NAME` | Object key of the network TLS trust certificate | Required |
//! | `ORDERER_URL` | Ordering service endpoint | Required |
//! | `ORG_NAME` | Member name (CA affiliation, storage namespace) | Required |
//! | `ORG_MSP_ID` | Member MSP id | Required |
//! | `PEERS` | `id=url` pairs, comma separated | Required |
//! | `CA_URL` | Certificate authority endpoint | Required |
//! | `CA_ADMIN_USER` | Registrar login | Required |
//! | `CA_ADMIN_SECRET` | Registrar secret | Required |
//! | `CREDENTIAL_BUCKET` | Credential bucket (directory root for `fs`) | Required |
//! | `CREDENTIAL_STORE_BACKEND` | `fs`, `s3` or `memory` | `fs` |
//! | `CREDENTIAL_STORE_ENDPOINT` | S3-compatible endpoint override (`s3` only) | AWS S3 |
//! | `IDP_USER_POOL_ID` | Identity-provider user pool | Required |
//! | `IDP_JWKS_URL` | JWKS override; `insecure-dev` disables signature checks | Derived from pool |
//! | `ENDORSEMENT_TIMEOUT_MS` | Endorsement wait | `2000` |
//! | `NETWORK_TIMEOUT_MS` | CA, store and handshake deadline | `10000` |
//! | `COMMIT_TIMEOUT_MS` | Commit notification deadline | `30000` |
//! | `SUBMIT_WAIT_FOR_COMMIT` | Submit handler waits for the commit | `false` |
//! | `QUERY_RESULT_POLICY` | `last` or `majority` | `last` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SERVER_TLS_CERT_PATH` | PEM certificate chain for HTTPS | Unset (plain HTTP) |
//! | `SERVER_TLS_KEY_PATH` | PEM private key for HTTPS | Unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::ledger::{
    AdminLogin, ChannelSettings, GatewaySettings, OrdererEndpoint, PeerEndpoint, ResultSelection,
    RetryPolicy,
};

pub const CHAINCODE_ID_ENV: &str = "CHAINCODE_ID";
pub const CHAINCODE_QUERY_FUNCTION_ENV: &str = "CHAINCODE_QUERY_FUNCTION";
pub const CHAINCODE_INVOKE_FUNCTION_ENV: &str = "CHAINCODE_INVOKE_FUNCTION";
pub const REGION_ENV: &str = "AWS_REGION";
pub const NETWORK_ID_ENV: &str = "NETWORK_ID";
pub const CHANNEL_ID_ENV: &str = "CHANNEL_ID";
pub const TLS_CERT_NAME_ENV: &str = "LEDGER_TLS_CERT_NAME";
pub const ORDERER_URL_ENV: &str = "ORDERER_URL";
pub const ORG_NAME_ENV: &str = "ORG_NAME";
pub const ORG_MSP_ID_ENV: &str = "ORG_MSP_ID";
pub const PEERS_ENV: &str = "PEERS";
pub const CA_URL_ENV: &str = "CA_URL";
pub const CA_ADMIN_USER_ENV: &str = "CA_ADMIN_USER";
pub const CA_ADMIN_SECRET_ENV: &str = "CA_ADMIN_SECRET";
pub const CREDENTIAL_BUCKET_ENV: &str = "CREDENTIAL_BUCKET";
pub const CREDENTIAL_STORE_BACKEND_ENV: &str = "CREDENTIAL_STORE_BACKEND";
pub const CREDENTIAL_STORE_ENDPOINT_ENV: &str = "CREDENTIAL_STORE_ENDPOINT";
pub const IDP_USER_POOL_ID_ENV: &str = "IDP_USER_POOL_ID";
pub const IDP_JWKS_URL_ENV: &str = "IDP_JWKS_URL";
pub const ENDORSEMENT_TIMEOUT_ENV: &str = "ENDORSEMENT_TIMEOUT_MS";
pub const NETWORK_TIMEOUT_ENV: &str = "NETWORK_TIMEOUT_MS";
pub const COMMIT_TIMEOUT_ENV: &str = "COMMIT_TIMEOUT_MS";
pub const SUBMIT_WAIT_FOR_COMMIT_ENV: &str = "SUBMIT_WAIT_FOR_COMMIT";
pub const QUERY_RESULT_POLICY_ENV: &str = "QUERY_RESULT_POLICY";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const SERVER_TLS_CERT_ENV: &str = "SERVER_TLS_CERT_PATH";
pub const SERVER_TLS_KEY_ENV: &str = "SERVER_TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// `IDP_JWKS_URL` value that switches token verification to development mode.
pub const INSECURE_DEV_JWKS: &str = "insecure-dev";

/// Endorsement wait used when `ENDORSEMENT_TIMEOUT_MS` is unset.
pub const DEFAULT_ENDORSEMENT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Where credential objects live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Directory tree rooted at the bucket path
    Filesystem(PathBuf),
    /// S3 bucket in the configured region
    S3 {
        bucket: String,
        endpoint: Option<String>,
    },
    /// Process-local, lost on restart
    Memory,
}

/// Chaincode functions exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaincodeConfig {
    pub id: String,
    pub query_function: String,
    pub invoke_function: String,
}

/// How ID tokens are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerification {
    /// Signature checked against the identity provider's JWKS
    Jwks { jwks_url: String, issuer: String },
    /// Structure and expiry only
    InsecureDev,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProviderConfig {
    pub user_pool_id: String,
    pub verification: TokenVerification,
}

/// HTTPS material for the public listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTls {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Immutable process configuration.
#[derive(Clone)]
pub struct GatewayConfig {
    pub region: String,
    pub network_id: String,
    pub chaincode: ChaincodeConfig,
    pub channel: Arc<ChannelSettings>,
    pub org_name: String,
    pub msp_id: String,
    pub ca_url: String,
    pub ca_admin: AdminLogin,
    pub credential_bucket: String,
    pub store_backend: StoreBackend,
    pub identity_provider: IdentityProviderConfig,
    pub endorsement_timeout: Duration,
    pub network_timeout: Duration,
    pub commit_timeout: Duration,
    pub submit_wait_for_commit: bool,
    pub query_policy: ResultSelection,
    pub bind_addr: SocketAddr,
    pub server_tls: Option<ServerTls>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("region", &self.region)
            .field("network_id", &self.network_id)
            .field("chaincode", &self.chaincode)
            .field("channel", &self.channel)
            .field("org_name", &self.org_name)
            .field("msp_id", &self.msp_id)
            .field("ca_url", &self.ca_url)
            .field("ca_admin", &self.ca_admin)
            .field("store_backend", &self.store_backend)
            .field("query_policy", &self.query_policy)
            .field("bind_addr", &self.bind_addr)
            .finish_non_exhaustive()
    }
}

impl GatewayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);

        let region = vars.required(REGION_ENV)?;
        let network_id = vars.required(NETWORK_ID_ENV)?;

        let chaincode = ChaincodeConfig {
            id: vars.required(CHAINCODE_ID_ENV)?,
            query_function: vars.required(CHAINCODE_QUERY_FUNCTION_ENV)?,
            invoke_function: vars.required(CHAINCODE_INVOKE_FUNCTION_ENV)?,
        };

        let channel = ChannelSettings {
            channel_id: vars.required(CHANNEL_ID_ENV)?,
            peers: parse_peers(&vars.required(PEERS_ENV)?)?,
            orderer: OrdererEndpoint {
                id: network_id.clone(),
                url: vars.required(ORDERER_URL_ENV)?,
            },
            tls_cert_name: vars.required(TLS_CERT_NAME_ENV)?,
        };

        let credential_bucket = vars.required(CREDENTIAL_BUCKET_ENV)?;
        let store_backend = match vars.optional(CREDENTIAL_STORE_BACKEND_ENV).as_deref() {
            None | Some("fs") => StoreBackend::Filesystem(PathBuf::from(&credential_bucket)),
            Some("s3") => StoreBackend::S3 {
                bucket: credential_bucket.clone(),
                endpoint: vars.optional(CREDENTIAL_STORE_ENDPOINT_ENV),
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: CREDENTIAL_STORE_BACKEND_ENV,
                    reason: format!("expected 'fs', 's3' or 'memory', got '{other}'"),
                })
            }
        };

        let user_pool_id = vars.required(IDP_USER_POOL_ID_ENV)?;
        let verification = match vars.optional(IDP_JWKS_URL_ENV) {
            Some(value) if value == INSECURE_DEV_JWKS => TokenVerification::InsecureDev,
            override_url => {
                let issuer = format!("https://cognito-idp.{region}.amazonaws.com/{user_pool_id}");
                let jwks_url =
                    override_url.unwrap_or_else(|| format!("{issuer}/.well-known/jwks.json"));
                TokenVerification::Jwks { jwks_url, issuer }
            }
        };

        let query_policy = match vars.optional(QUERY_RESULT_POLICY_ENV) {
            None => ResultSelection::default(),
            Some(raw) => raw.parse::<ResultSelection>().map_err(|reason| ConfigError::Invalid {
                var: QUERY_RESULT_POLICY_ENV,
                reason,
            })?,
        };

        let host = vars
            .optional(HOST_ENV)
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = vars.parsed(PORT_ENV, 8080)?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|e| ConfigError::Invalid {
                var: HOST_ENV,
                reason: format!("{e}"),
            })?;

        let server_tls = match (
            vars.optional(SERVER_TLS_CERT_ENV),
            vars.optional(SERVER_TLS_KEY_ENV),
        ) {
            (Some(cert), Some(key)) => Some(ServerTls {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(SERVER_TLS_KEY_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(SERVER_TLS_CERT_ENV)),
        };

        Ok(Self {
            region,
            network_id,
            chaincode,
            channel: Arc::new(channel),
            org_name: vars.required(ORG_NAME_ENV)?,
            msp_id: vars.required(ORG_MSP_ID_ENV)?,
            ca_url: vars.required(CA_URL_ENV)?,
            ca_admin: AdminLogin {
                login: vars.required(CA_ADMIN_USER_ENV)?,
                secret: vars.required(CA_ADMIN_SECRET_ENV)?,
            },
            credential_bucket,
            store_backend,
            identity_provider: IdentityProviderConfig {
                user_pool_id,
                verification,
            },
            endorsement_timeout: Duration::from_millis(
                vars.parsed(ENDORSEMENT_TIMEOUT_ENV, DEFAULT_ENDORSEMENT_TIMEOUT_MS)?,
            ),
            network_timeout: Duration::from_millis(
                vars.parsed(NETWORK_TIMEOUT_ENV, DEFAULT_NETWORK_TIMEOUT_MS)?,
            ),
            commit_timeout: Duration::from_millis(
                vars.parsed(COMMIT_TIMEOUT_ENV, DEFAULT_COMMIT_TIMEOUT_MS)?,
            ),
            submit_wait_for_commit: vars.parsed(SUBMIT_WAIT_FOR_COMMIT_ENV, false)?,
            query_policy,
            bind_addr,
            server_tls,
        })
    }

    /// Protocol settings for the transaction gateway.
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            chaincode_id: self.chaincode.id.clone(),
            endorsement_timeout: self.endorsement_timeout,
            commit_timeout: self.commit_timeout,
            selection: self.query_policy,
            query_retry: RetryPolicy::default(),
        }
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Present and non-blank, trimmed.
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: name,
                reason: format!("'{raw}': {e}"),
            }),
        }
    }
}

/// Parse `id=url,id=url`.
fn parse_peers(raw: &str) -> Result<Vec<PeerEndpoint>, ConfigError> {
    let mut peers = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, url) = entry
            .split_once('=')
            .map(|(id, url)| (id.trim(), url.trim()))
            .filter(|(id, url)| !id.is_empty() && !url.is_empty())
            .ok_or_else(|| ConfigError::Invalid {
                var: PEERS_ENV,
                reason: format!("expected id=url, got '{entry}'"),
            })?;
        if peers.iter().any(|p: &PeerEndpoint| p.id == id) {
            return Err(ConfigError::Invalid {
                var: PEERS_ENV,
                reason: format!("duplicate peer id '{id}'"),
            });
        }
        peers.push(PeerEndpoint {
            id: id.to_string(),
            url: url.to_string(),
        });
    }

    if peers.is_empty() {
        return Err(ConfigError::Invalid {
            var: PEERS_ENV,
            reason: "no peers listed".to_string(),
        });
    }
    Ok(peers)
}
