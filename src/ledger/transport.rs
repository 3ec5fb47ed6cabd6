// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Peer and ordering-service transports.
//!
//! The gateway only talks to [`EndorsingPeer`] and [`OrderingService`]
//! handles produced by a [`LedgerConnector`]. The shipped [`HttpConnector`]
//! exchanges JSON over HTTPS:
//!
//! | Call | Request |
//! |------|---------|
//! | handshake | `GET {endpoint}/` |
//! | proposal | `POST {peer}/v1/proposals` |
//! | broadcast | `POST {orderer}/v1/broadcast` |
//! | commit | `GET {orderer}/v1/transactions/{tx_id}/commit` (long poll) |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::crypto::sign;
use super::tls::{http_client, https_endpoint};
use super::types::{CommitEvent, Enrollment, OrdererEndpoint, PeerEndpoint, ProposalResponse};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Endpoint answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

impl TransportError {
    /// Connection-level failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connect { .. } | TransportError::Request(_) => true,
            TransportError::Rejected { status, .. } => *status >= 500,
            TransportError::InvalidResponse(_) | TransportError::Encoding(_) => false,
        }
    }
}

/// Chaincode call bound to its creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalPayload {
    pub channel_id: String,
    pub chaincode_id: String,
    pub function: String,
    pub args: Vec<String>,
    pub transaction_id: String,
    /// base64 nonce
    pub nonce: String,
    pub creator_msp_id: String,
    pub creator_certificate: String,
    /// Query proposals are never submitted for ordering
    pub read_only: bool,
    pub timestamp: DateTime<Utc>,
}

/// Serialized proposal plus the creator's signature over exactly those bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedProposal {
    /// base64 of the JSON-encoded [`ProposalPayload`]
    pub proposal_bytes: String,
    /// base64 DER ECDSA signature
    pub signature: String,
}

impl SignedProposal {
    pub fn sign(payload: &ProposalPayload, signer: &Enrollment) -> Result<Self, TransportError> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| TransportError::Encoding(e.to_string()))?;
        let signature = sign(signer.signing_key(), &bytes);
        Ok(Self {
            proposal_bytes: Base64::encode_string(&bytes),
            signature: Base64::encode_string(&signature),
        })
    }

    /// Decode the signed payload.
    pub fn payload(&self) -> Result<ProposalPayload, TransportError> {
        let bytes = Base64::decode_vec(&self.proposal_bytes)
            .map_err(|e| TransportError::Encoding(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Encoding(e.to_string()))
    }
}

/// Endorsed transaction handed to the ordering service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub transaction_id: String,
    pub proposal: SignedProposal,
    pub endorsements: Vec<ProposalResponse>,
    /// base64 DER signature over [`TransactionEnvelope::signing_bytes`]
    pub signature: String,
}

impl TransactionEnvelope {
    pub fn sign(
        proposal: SignedProposal,
        transaction_id: &str,
        endorsements: Vec<ProposalResponse>,
        signer: &Enrollment,
    ) -> Result<Self, TransportError> {
        let mut envelope = Self {
            transaction_id: transaction_id.to_string(),
            proposal,
            endorsements,
            signature: String::new(),
        };
        let signature = sign(signer.signing_key(), &envelope.signing_bytes()?);
        envelope.signature = Base64::encode_string(&signature);
        Ok(envelope)
    }

    pub fn signing_bytes(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(&(
            &self.transaction_id,
            &self.proposal.proposal_bytes,
            &self.endorsements,
        ))
        .map_err(|e| TransportError::Encoding(e.to_string()))
    }
}

/// A peer that simulates proposals and endorses their results.
#[async_trait]
pub trait EndorsingPeer: Send + Sync {
    fn id(&self) -> &str;

    async fn process_proposal(
        &self,
        proposal: &SignedProposal,
    ) -> Result<ProposalResponse, TransportError>;
}

/// The service that orders endorsed transactions into blocks.
#[async_trait]
pub trait OrderingService: Send + Sync {
    fn id(&self) -> &str;

    /// Submit an endorsed transaction. Returns once the service accepted it.
    async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<(), TransportError>;

    /// Wait until the transaction is committed (or invalidated) in a block.
    async fn wait_for_commit(&self, transaction_id: &str) -> Result<CommitEvent, TransportError>;
}

/// Opens transports to channel endpoints using the network's trust material.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn connect_peer(
        &self,
        endpoint: &PeerEndpoint,
        trust_material: &[u8],
    ) -> Result<Arc<dyn EndorsingPeer>, TransportError>;

    async fn connect_orderer(
        &self,
        endpoint: &OrdererEndpoint,
        trust_material: &[u8],
    ) -> Result<Arc<dyn OrderingService>, TransportError>;
}

// =============================================================================
// HTTP adapters
// =============================================================================

/// JSON-over-HTTPS connector.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    network_timeout: Duration,
    commit_timeout: Duration,
}

impl HttpConnector {
    pub fn new(network_timeout: Duration, commit_timeout: Duration) -> Self {
        Self {
            network_timeout,
            commit_timeout,
        }
    }

    async fn open(&self, url: &str, trust_material: &[u8]) -> Result<(String, Client), TransportError> {
        let base_url = https_endpoint(url);
        let http = http_client(Some(trust_material), self.network_timeout).map_err(|e| {
            TransportError::Connect {
                endpoint: base_url.clone(),
                reason: e.to_string(),
            }
        })?;

        // Any HTTP answer means TCP and TLS were established.
        http.get(&base_url)
            .send()
            .await
            .map_err(|e| TransportError::Connect {
                endpoint: base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok((base_url, http))
    }
}

#[async_trait]
impl LedgerConnector for HttpConnector {
    async fn connect_peer(
        &self,
        endpoint: &PeerEndpoint,
        trust_material: &[u8],
    ) -> Result<Arc<dyn EndorsingPeer>, TransportError> {
        let (base_url, http) = self.open(&endpoint.url, trust_material).await?;
        tracing::debug!(peer_id = %endpoint.id, url = %base_url, "Connected to peer");
        Ok(Arc::new(HttpPeer {
            id: endpoint.id.clone(),
            base_url,
            http,
        }))
    }

    async fn connect_orderer(
        &self,
        endpoint: &OrdererEndpoint,
        trust_material: &[u8],
    ) -> Result<Arc<dyn OrderingService>, TransportError> {
        let (base_url, http) = self.open(&endpoint.url, trust_material).await?;
        tracing::debug!(orderer_id = %endpoint.id, url = %base_url, "Connected to orderer");
        Ok(Arc::new(HttpOrderer {
            id: endpoint.id.clone(),
            base_url,
            http,
            commit_timeout: self.commit_timeout,
        }))
    }
}

pub struct HttpPeer {
    id: String,
    base_url: String,
    http: Client,
}

#[async_trait]
impl EndorsingPeer for HttpPeer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn process_proposal(
        &self,
        proposal: &SignedProposal,
    ) -> Result<ProposalResponse, TransportError> {
        let response = self
            .http
            .post(format!("{}/v1/proposals", self.base_url))
            .json(proposal)
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("peer {}: {e}", self.id)))?;

        let mut parsed: ProposalResponse = read_json(response).await?;
        // Attribute the response to the peer we asked, whatever it calls itself.
        parsed.peer_id = self.id.clone();
        Ok(parsed)
    }
}

pub struct HttpOrderer {
    id: String,
    base_url: String,
    http: Client,
    commit_timeout: Duration,
}

#[derive(Deserialize)]
struct BroadcastAck {
    status: String,
    #[serde(default)]
    info: String,
}

#[async_trait]
impl OrderingService for HttpOrderer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<(), TransportError> {
        let response = self
            .http
            .post(format!("{}/v1/broadcast", self.base_url))
            .json(envelope)
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("orderer {}: {e}", self.id)))?;

        let ack: BroadcastAck = read_json(response).await?;
        if ack.status != "SUCCESS" {
            return Err(TransportError::InvalidResponse(format!(
                "broadcast not accepted: {} {}",
                ack.status, ack.info
            )));
        }
        Ok(())
    }

    async fn wait_for_commit(&self, transaction_id: &str) -> Result<CommitEvent, TransportError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/transactions/{transaction_id}/commit",
                self.base_url
            ))
            .timeout(self.commit_timeout)
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("orderer {}: {e}", self.id)))?;

        read_json(response).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))
}
