// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger domain types.

use std::fmt;

use p256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Private key + certificate issued by the CA.
///
/// `Debug` never prints key material.
#[derive(Clone, PartialEq)]
pub struct Enrollment {
    signing_key: SigningKey,
    certificate_pem: String,
}

impl Enrollment {
    pub fn new(signing_key: SigningKey, certificate_pem: impl Into<String>) -> Self {
        Self {
            signing_key,
            certificate_pem: certificate_pem.into(),
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }
}

impl fmt::Debug for Enrollment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enrollment")
            .field("signing_key", &"<redacted>")
            .field("certificate_pem_len", &self.certificate_pem.len())
            .finish()
    }
}

/// A signing identity bound to one organization.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Name the CA knows this identity by
    pub user_id: String,
    /// Organization (member name), also the CA affiliation and storage namespace
    pub organization_id: String,
    /// MSP id of the organization
    pub member_id: String,
    pub enrollment: Enrollment,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        organization_id: impl Into<String>,
        member_id: impl Into<String>,
        enrollment: Enrollment,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            member_id: member_id.into(),
            enrollment,
        }
    }
}

/// A peer the channel sends proposals to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerEndpoint {
    pub id: String,
    pub url: String,
}

/// The ordering service endpoint of the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdererEndpoint {
    pub id: String,
    pub url: String,
}

/// Endorsement status reported by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Success,
    Failure,
}

/// One peer's answer to a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub peer_id: String,
    pub status: ProposalStatus,
    /// Chaincode response payload
    #[serde(default)]
    pub payload: String,
    pub transaction_id: String,
    #[serde(default)]
    pub message: String,
    /// Peer's signature over the proposal response (opaque, forwarded to the orderer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endorsement: Option<String>,
}

impl ProposalResponse {
    pub fn is_success(&self) -> bool {
        self.status == ProposalStatus::Success
    }

    /// Synthesized failure for a peer that did not answer in time or could not be reached.
    pub fn unreachable(peer_id: &str, transaction_id: &str, message: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            status: ProposalStatus::Failure,
            payload: String::new(),
            transaction_id: transaction_id.to_string(),
            message: message.into(),
            endorsement: None,
        }
    }
}

/// Commit state of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    Pending,
    Committed,
    Failed,
}

/// Notification emitted once the transaction lands in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub transaction_id: String,
    pub block_number: u64,
    pub valid: bool,
    /// Validation code reported by the committing peer (e.g. `VALID`, `MVCC_READ_CONFLICT`)
    #[serde(default)]
    pub validation_code: String,
}

impl CommitEvent {
    pub fn status(&self) -> CommitStatus {
        if self.valid {
            CommitStatus::Committed
        } else {
            CommitStatus::Failed
        }
    }
}
