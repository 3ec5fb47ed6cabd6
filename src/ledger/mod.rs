// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Module
//!
//! Identity enrollment and chaincode access on the permissioned ledger.
//!
//! ## Pipeline (one per request)
//!
//! ```text
//! IdentityManager ──> TopologyBuilder ──> TransactionGateway
//!  (credentials,       (trust material,     (query / invoke,
//!   CA enrollment)      peers, orderer)      commit handle)
//! ```
//!
//! Nothing built here outlives the request except the enrollment lock registry
//! and the credential records themselves.

pub mod ca;
pub mod channel;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod retry;
pub mod tls;
pub mod transport;
pub mod types;

pub use ca::{CaError, CertificateAuthority, FabricCaClient};
pub use channel::{ChannelSettings, ChannelTopology, TopologyBuilder};
pub use error::{ErrorClass, LedgerError, LedgerResult};
pub use gateway::{
    CommitHandle, GatewaySettings, ResultSelection, TransactionGateway, TransactionOutcome,
};
pub use identity::{AdminLogin, EnrollmentLocks, IdentityManager};
pub use retry::RetryPolicy;
pub use transport::{EndorsingPeer, HttpConnector, LedgerConnector, OrderingService};
pub use types::{
    CommitEvent, CommitStatus, Enrollment, Identity, OrdererEndpoint, PeerEndpoint,
    ProposalResponse, ProposalStatus,
};
