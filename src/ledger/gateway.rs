// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chaincode query and invoke protocols.
//!
//! ## Query
//!
//! Read-only proposal to every peer of the channel. Responses are collected in
//! arrival order and one successful payload is selected by [`ResultSelection`].
//! Transport failures are retried (queries are idempotent).
//!
//! ## Invoke
//!
//! ```text
//! proposal ──> all peers (bounded wait) ──> every response SUCCESS?
//!                                           ├─ no  ──> EndorsementFailed, orderer untouched
//!                                           └─ yes ──> one broadcast ──> TransactionOutcome (pending)
//!                                                                        └─ commit listener ──> CommitHandle
//! ```
//!
//! Neither the endorsement round nor the broadcast is retried.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use super::channel::ChannelTopology;
use super::crypto::{new_nonce, transaction_id};
use super::error::{LedgerError, LedgerResult};
use super::retry::{retry_idempotent, RetryPolicy};
use super::transport::{
    EndorsingPeer, OrderingService, ProposalPayload, SignedProposal, TransactionEnvelope,
    TransportError,
};
use super::types::{CommitEvent, CommitStatus, Identity, ProposalResponse};

/// How a query picks its result among successful peer responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultSelection {
    /// Payload of the last successful response processed
    #[default]
    Last,
    /// Most common successful payload; ties go to the earliest arrival
    Majority,
}

impl FromStr for ResultSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last" => Ok(ResultSelection::Last),
            "majority" => Ok(ResultSelection::Majority),
            other => Err(format!("unknown query result policy '{other}'")),
        }
    }
}

impl ResultSelection {
    /// Pick a payload from `responses` (arrival order). Failures never contribute.
    pub fn select(self, responses: &[ProposalResponse]) -> Option<&str> {
        let successes = responses.iter().filter(|r| r.is_success());
        match self {
            ResultSelection::Last => successes.last().map(|r| r.payload.as_str()),
            ResultSelection::Majority => {
                let mut tally: HashMap<&str, (usize, usize)> = HashMap::new();
                for (arrival, response) in successes.enumerate() {
                    tally
                        .entry(response.payload.as_str())
                        .or_insert((0, arrival))
                        .0 += 1;
                }
                tally
                    .into_iter()
                    .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                        count_a.cmp(count_b).then(first_b.cmp(first_a))
                    })
                    .map(|(payload, _)| payload)
            }
        }
    }
}

/// Protocol parameters shared by every request.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Chaincode targeted by invokes
    pub chaincode_id: String,
    pub endorsement_timeout: Duration,
    /// Upper bound for the background commit listener
    pub commit_timeout: Duration,
    pub selection: ResultSelection,
    pub query_retry: RetryPolicy,
}

/// Pending commit notification for a submitted transaction.
#[derive(Debug)]
pub struct CommitHandle {
    transaction_id: String,
    receiver: oneshot::Receiver<LedgerResult<CommitEvent>>,
}

impl CommitHandle {
    /// Wait up to `timeout` for the commit notification.
    pub async fn wait(self, timeout: Duration) -> LedgerResult<CommitEvent> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LedgerError::proposal(
                "commit notification",
                "listener stopped before reporting",
            )),
            Err(_) => Err(LedgerError::CommitTimeout {
                transaction_id: self.transaction_id,
                timeout_ms: timeout.as_millis(),
            }),
        }
    }
}

/// Result of an accepted invoke.
#[derive(Debug)]
pub struct TransactionOutcome {
    pub accepted: bool,
    pub transaction_id: String,
    pub commit_status: CommitStatus,
    commit: Option<CommitHandle>,
}

impl TransactionOutcome {
    /// Wait for the commit notification and record the final status.
    ///
    /// A second call returns the recorded status without waiting.
    pub async fn wait_for_commit(&mut self, timeout: Duration) -> LedgerResult<CommitStatus> {
        let Some(handle) = self.commit.take() else {
            return Ok(self.commit_status);
        };
        let event = handle.wait(timeout).await?;
        self.commit_status = event.status();
        Ok(self.commit_status)
    }

    /// Detach the commit handle, leaving the outcome pending.
    pub fn into_commit_handle(self) -> Option<CommitHandle> {
        self.commit
    }
}

/// Executes chaincode queries and invokes on a channel.
#[derive(Debug, Clone)]
pub struct TransactionGateway {
    settings: Arc<GatewaySettings>,
}

impl TransactionGateway {
    pub fn new(settings: Arc<GatewaySettings>) -> Self {
        Self { settings }
    }

    /// Evaluate `function(arg)` on `chaincode_id` as the channel's client identity.
    pub async fn query(
        &self,
        topology: &ChannelTopology,
        chaincode_id: &str,
        function: &str,
        arg: &str,
    ) -> LedgerResult<String> {
        let (proposal, tx_id) = build_proposal(
            topology,
            topology.client(),
            chaincode_id,
            function,
            vec![arg.to_string()],
            true,
        )?;

        let responses = self
            .broadcast_proposal(topology, proposal, &tx_id, self.settings.query_retry)
            .await;

        for response in responses.iter().filter(|r| !r.is_success()) {
            tracing::warn!(
                peer_id = %response.peer_id,
                transaction_id = %tx_id,
                message = %response.message,
                "Query proposal failed on peer"
            );
        }

        match self.settings.selection.select(&responses) {
            Some(payload) => {
                tracing::debug!(
                    transaction_id = %tx_id,
                    function = %function,
                    responses = responses.len(),
                    "Query completed"
                );
                Ok(payload.to_string())
            }
            None => Err(LedgerError::proposal(
                "query",
                format!("no successful response: {}", failure_detail(&responses)),
            )),
        }
    }

    /// Endorse `function(args)` on every peer and submit to the orderer when all agree.
    pub async fn invoke(
        &self,
        topology: &ChannelTopology,
        identity: &Identity,
        function: &str,
        args: &[String],
    ) -> LedgerResult<TransactionOutcome> {
        let (proposal, tx_id) = build_proposal(
            topology,
            identity,
            &self.settings.chaincode_id,
            function,
            args.to_vec(),
            false,
        )?;

        let responses = self
            .broadcast_proposal(topology, proposal.clone(), &tx_id, RetryPolicy::none())
            .await;

        let failed = responses.iter().filter(|r| !r.is_success()).count();
        if responses.is_empty() {
            tracing::warn!(transaction_id = %tx_id, "Channel has no endorsing peers, transaction not submitted");
            return Err(LedgerError::EndorsementFailed {
                failed: 0,
                total: 0,
                detail: failure_detail(&responses),
            });
        }
        if failed > 0 {
            tracing::warn!(
                transaction_id = %tx_id,
                failed,
                total = responses.len(),
                "Endorsement rejected, transaction not submitted"
            );
            return Err(LedgerError::EndorsementFailed {
                failed,
                total: responses.len(),
                detail: failure_detail(&responses),
            });
        }

        tracing::info!(
            transaction_id = %tx_id,
            endorsements = responses.len(),
            "Transaction endorsed by all peers, submitting to orderer"
        );

        let envelope = TransactionEnvelope::sign(proposal, &tx_id, responses, &identity.enrollment)
            .map_err(|e| LedgerError::proposal("envelope signing", e))?;

        let orderer = topology.orderer().clone();
        orderer
            .broadcast(&envelope)
            .await
            .map_err(|e| LedgerError::proposal("ordering submission", e))?;

        let commit = spawn_commit_listener(orderer, tx_id.clone(), self.settings.commit_timeout);

        Ok(TransactionOutcome {
            accepted: true,
            transaction_id: tx_id,
            commit_status: CommitStatus::Pending,
            commit: Some(commit),
        })
    }

    /// Send `proposal` to every peer and collect one response per peer in arrival order.
    ///
    /// Peers that fail or miss the endorsement deadline yield a synthesized failure.
    async fn broadcast_proposal(
        &self,
        topology: &ChannelTopology,
        proposal: SignedProposal,
        tx_id: &str,
        retry: RetryPolicy,
    ) -> Vec<ProposalResponse> {
        let proposal = Arc::new(proposal);
        let deadline = self.settings.endorsement_timeout;

        let mut pending = JoinSet::new();
        for peer in topology.peers().iter().cloned() {
            let proposal = proposal.clone();
            let tx_id = tx_id.to_string();
            pending.spawn(async move {
                let peer_id = peer.id().to_string();
                let outcome = tokio::time::timeout(deadline, send(&peer, &proposal, &retry)).await;
                match outcome {
                    Ok(Ok(response)) if response.transaction_id != tx_id => {
                        ProposalResponse::unreachable(&peer_id, &tx_id, "transaction id mismatch")
                    }
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => ProposalResponse::unreachable(&peer_id, &tx_id, e.to_string()),
                    Err(_) => ProposalResponse::unreachable(
                        &peer_id,
                        &tx_id,
                        format!("no response within {} ms", deadline.as_millis()),
                    ),
                }
            });
        }

        let mut responses = Vec::with_capacity(topology.peers().len());
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(response) => responses.push(response),
                Err(e) => {
                    tracing::error!(error = %e, transaction_id = %tx_id, "Proposal task failed");
                    responses.push(ProposalResponse::unreachable(
                        "unknown",
                        tx_id,
                        format!("proposal task failed: {e}"),
                    ));
                }
            }
        }
        responses
    }
}

async fn send(
    peer: &Arc<dyn EndorsingPeer>,
    proposal: &SignedProposal,
    retry: &RetryPolicy,
) -> Result<ProposalResponse, TransportError> {
    retry_idempotent(
        "proposal",
        retry,
        TransportError::is_transient,
        || peer.process_proposal(proposal),
    )
    .await
}

fn build_proposal(
    topology: &ChannelTopology,
    creator: &Identity,
    chaincode_id: &str,
    function: &str,
    args: Vec<String>,
    read_only: bool,
) -> LedgerResult<(SignedProposal, String)> {
    let nonce = new_nonce();
    let certificate = creator.enrollment.certificate_pem();
    let tx_id = transaction_id(&nonce, certificate.as_bytes());

    let payload = ProposalPayload {
        channel_id: topology.channel_id().to_string(),
        chaincode_id: chaincode_id.to_string(),
        function: function.to_string(),
        args,
        transaction_id: tx_id.clone(),
        nonce: Base64::encode_string(&nonce),
        creator_msp_id: creator.member_id.clone(),
        creator_certificate: certificate.to_string(),
        read_only,
        timestamp: Utc::now(),
    };

    let signed = SignedProposal::sign(&payload, &creator.enrollment)
        .map_err(|e| LedgerError::proposal("proposal signing", e))?;
    Ok((signed, tx_id))
}

fn failure_detail(responses: &[ProposalResponse]) -> String {
    let failures: Vec<String> = responses
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| format!("{}: {}", r.peer_id, r.message))
        .collect();
    if failures.is_empty() {
        "no peers answered".to_string()
    } else {
        failures.join("; ")
    }
}

/// Wait for the commit in the background; always log it, deliver it if anyone listens.
fn spawn_commit_listener(
    orderer: Arc<dyn OrderingService>,
    tx_id: String,
    timeout: Duration,
) -> CommitHandle {
    let (sender, receiver) = oneshot::channel();
    let handle = CommitHandle {
        transaction_id: tx_id.clone(),
        receiver,
    };

    tokio::spawn(async move {
        let result = match tokio::time::timeout(timeout, orderer.wait_for_commit(&tx_id)).await {
            Ok(Ok(event)) => {
                tracing::info!(
                    transaction_id = %event.transaction_id,
                    block_number = event.block_number,
                    valid = event.valid,
                    validation_code = %event.validation_code,
                    "Transaction committed"
                );
                Ok(event)
            }
            Ok(Err(e)) => {
                tracing::error!(transaction_id = %tx_id, error = %e, "Commit notification failed");
                Err(LedgerError::proposal("commit notification", e))
            }
            Err(_) => {
                tracing::warn!(
                    transaction_id = %tx_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "No commit notification before deadline"
                );
                Err(LedgerError::CommitTimeout {
                    transaction_id: tx_id.clone(),
                    timeout_ms: timeout.as_millis(),
                })
            }
        };
        // Receiver dropped means nobody waits; the log line above is the record.
        let _ = sender.send(result);
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::crypto::generate_signing_key;
    use crate::ledger::types::{Enrollment, ProposalStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct FakePeer {
        id: String,
        status: ProposalStatus,
        payload: String,
        delay: Duration,
        /// Transport failures before answering
        flaky: AtomicUsize,
        calls: AtomicUsize,
        seen: Mutex<Vec<ProposalPayload>>,
    }

    impl FakePeer {
        fn new(id: &str, status: ProposalStatus, payload: &str) -> Self {
            Self {
                id: id.to_string(),
                status,
                payload: payload.to_string(),
                delay: Duration::ZERO,
                flaky: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn delayed(mut self, millis: u64) -> Self {
            self.delay = Duration::from_millis(millis);
            self
        }

        fn flaky(self, failures: usize) -> Self {
            self.flaky.store(failures, Ordering::SeqCst);
            self
        }
    }

    #[async_trait]
    impl EndorsingPeer for FakePeer {
        fn id(&self) -> &str {
            &self.id
        }

        async fn process_proposal(
            &self,
            proposal: &SignedProposal,
        ) -> Result<ProposalResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self
                .flaky
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::Request("connection reset".into()));
            }
            let payload = proposal.payload()?;
            let transaction_id = payload.transaction_id.clone();
            self.seen.lock().await.push(payload);
            Ok(ProposalResponse {
                peer_id: self.id.clone(),
                status: self.status,
                payload: self.payload.clone(),
                transaction_id,
                message: match self.status {
                    ProposalStatus::Success => String::new(),
                    ProposalStatus::Failure => "chaincode error: invalid commodity".into(),
                },
                endorsement: Some(format!("endorsed-by-{}", self.id)),
            })
        }
    }

    #[derive(Default)]
    struct FakeOrderer {
        broadcasts: Mutex<Vec<TransactionEnvelope>>,
        commit_delay: Duration,
        reject: bool,
        invalid: bool,
    }

    #[async_trait]
    impl OrderingService for FakeOrderer {
        fn id(&self) -> &str {
            "orderer"
        }

        async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<(), TransportError> {
            self.broadcasts.lock().await.push(envelope.clone());
            if self.reject {
                return Err(TransportError::Rejected {
                    status: 503,
                    body: "service unavailable".into(),
                });
            }
            Ok(())
        }

        async fn wait_for_commit(&self, transaction_id: &str) -> Result<CommitEvent, TransportError> {
            tokio::time::sleep(self.commit_delay).await;
            Ok(CommitEvent {
                transaction_id: transaction_id.to_string(),
                block_number: 9,
                valid: !self.invalid,
                validation_code: if self.invalid { "MVCC_READ_CONFLICT" } else { "VALID" }.into(),
            })
        }
    }

    fn identity() -> Identity {
        Identity::new(
            "alice",
            "org1",
            "Org1MSP",
            Enrollment::new(generate_signing_key(), "-----BEGIN CERTIFICATE-----\nalice\n"),
        )
    }

    fn topology(peers: Vec<Arc<FakePeer>>, orderer: Arc<FakeOrderer>) -> ChannelTopology {
        ChannelTopology::new(
            "mychannel",
            peers.into_iter().map(|p| p as Arc<dyn EndorsingPeer>).collect(),
            orderer,
            b"trust".to_vec(),
            identity(),
        )
    }

    fn gateway(selection: ResultSelection) -> TransactionGateway {
        TransactionGateway::new(Arc::new(GatewaySettings {
            chaincode_id: "commodity".into(),
            endorsement_timeout: Duration::from_millis(200),
            commit_timeout: Duration::from_secs(2),
            selection,
            query_retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        }))
    }

    fn success(peer: &str, payload: &str) -> ProposalResponse {
        ProposalResponse {
            peer_id: peer.into(),
            status: ProposalStatus::Success,
            payload: payload.into(),
            transaction_id: "tx".into(),
            message: String::new(),
            endorsement: None,
        }
    }

    fn failure(peer: &str) -> ProposalResponse {
        ProposalResponse::unreachable(peer, "tx", "down")
    }

    #[test]
    fn last_policy_takes_last_success() {
        let responses = vec![success("a", "1"), success("b", "2"), failure("c")];
        assert_eq!(ResultSelection::Last.select(&responses), Some("2"));
        assert_eq!(ResultSelection::Last.select(&[failure("a")]), None);
    }

    #[test]
    fn majority_policy_prefers_count_then_arrival() {
        let responses = vec![success("a", "x"), success("b", "y"), success("c", "y")];
        assert_eq!(ResultSelection::Majority.select(&responses), Some("y"));

        let tie = vec![success("a", "x"), success("b", "y")];
        assert_eq!(ResultSelection::Majority.select(&tie), Some("x"));

        let with_failures = vec![failure("a"), failure("b"), success("c", "z")];
        assert_eq!(ResultSelection::Majority.select(&with_failures), Some("z"));
    }

    #[test]
    fn selection_parses_from_config_strings() {
        assert_eq!("last".parse::<ResultSelection>(), Ok(ResultSelection::Last));
        assert_eq!(" Majority ".parse::<ResultSelection>(), Ok(ResultSelection::Majority));
        assert!("first".parse::<ResultSelection>().is_err());
    }

    #[tokio::test]
    async fn query_returns_agreed_payload() {
        let peers = vec![
            Arc::new(FakePeer::new("peer1", ProposalStatus::Success, r#"{"id":"widget-1"}"#)),
            Arc::new(FakePeer::new("peer2", ProposalStatus::Success, r#"{"id":"widget-1"}"#)),
        ];
        let topology = topology(peers.clone(), Arc::new(FakeOrderer::default()));

        let result = gateway(ResultSelection::Last)
            .query(&topology, "commodity", "get", "widget-1")
            .await
            .unwrap();
        assert_eq!(result, r#"{"id":"widget-1"}"#);

        let seen = peers[0].seen.lock().await;
        assert_eq!(seen[0].chaincode_id, "commodity");
        assert_eq!(seen[0].function, "get");
        assert_eq!(seen[0].args, vec!["widget-1"]);
        assert!(seen[0].read_only);
        assert_eq!(seen[0].creator_msp_id, "Org1MSP");
    }

    #[tokio::test]
    async fn query_last_policy_follows_arrival_order() {
        let peers = vec![
            Arc::new(FakePeer::new("slow", ProposalStatus::Success, "late").delayed(60)),
            Arc::new(FakePeer::new("fast", ProposalStatus::Success, "early")),
        ];
        let topology = topology(peers, Arc::new(FakeOrderer::default()));

        let result = gateway(ResultSelection::Last)
            .query(&topology, "commodity", "get", "w")
            .await
            .unwrap();
        assert_eq!(result, "late");
    }

    #[tokio::test]
    async fn query_ignores_failed_peers() {
        let peers = vec![
            Arc::new(FakePeer::new("good", ProposalStatus::Success, "value")),
            Arc::new(FakePeer::new("bad", ProposalStatus::Failure, "").delayed(30)),
        ];
        let topology = topology(peers, Arc::new(FakeOrderer::default()));

        let result = gateway(ResultSelection::Last)
            .query(&topology, "commodity", "get", "w")
            .await
            .unwrap();
        assert_eq!(result, "value");
    }

    #[tokio::test]
    async fn query_without_success_is_proposal_error() {
        let peers = vec![
            Arc::new(FakePeer::new("peer1", ProposalStatus::Failure, "")),
            Arc::new(FakePeer::new("peer2", ProposalStatus::Success, "x").delayed(1_000)),
        ];
        let topology = topology(peers, Arc::new(FakeOrderer::default()));

        let result = gateway(ResultSelection::Last)
            .query(&topology, "commodity", "get", "w")
            .await;
        match result {
            Err(LedgerError::Proposal { operation, reason }) => {
                assert_eq!(operation, "query");
                assert!(reason.contains("peer1"));
                assert!(reason.contains("peer2: no response within"));
            }
            other => panic!("expected proposal error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_retries_transient_transport_failures() {
        let flaky = Arc::new(FakePeer::new("peer1", ProposalStatus::Success, "v").flaky(2));
        let topology = topology(vec![flaky.clone()], Arc::new(FakeOrderer::default()));

        let result = gateway(ResultSelection::Last)
            .query(&topology, "commodity", "get", "w")
            .await
            .unwrap();
        assert_eq!(result, "v");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invoke_with_any_failure_never_reaches_orderer() {
        let peers = vec![
            Arc::new(FakePeer::new("peerA", ProposalStatus::Success, "")),
            Arc::new(FakePeer::new("peerB", ProposalStatus::Failure, "")),
        ];
        let orderer = Arc::new(FakeOrderer::default());
        let topology = topology(peers, orderer.clone());
        let identity = topology.client().clone();

        let result = gateway(ResultSelection::Last)
            .invoke(&topology, &identity, "put", &[r#"{"id":"widget-1"}"#.to_string()])
            .await;

        match result {
            Err(LedgerError::EndorsementFailed { failed, total, detail }) => {
                assert_eq!((failed, total), (1, 2));
                assert!(detail.contains("peerB"));
            }
            other => panic!("expected endorsement failure, got {other:?}"),
        }
        assert!(orderer.broadcasts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn invoke_timeout_counts_as_failure() {
        let peers = vec![
            Arc::new(FakePeer::new("peerA", ProposalStatus::Success, "")),
            Arc::new(FakePeer::new("peerB", ProposalStatus::Success, "").delayed(1_000)),
        ];
        let orderer = Arc::new(FakeOrderer::default());
        let topology = topology(peers, orderer.clone());
        let identity = topology.client().clone();

        let result = gateway(ResultSelection::Last)
            .invoke(&topology, &identity, "put", &["{}".to_string()])
            .await;
        assert!(matches!(result, Err(LedgerError::EndorsementFailed { failed: 1, .. })));
        assert!(orderer.broadcasts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn invoke_without_peers_never_reaches_orderer() {
        let orderer = Arc::new(FakeOrderer::default());
        let topology = topology(Vec::new(), orderer.clone());
        let identity = topology.client().clone();

        let result = gateway(ResultSelection::Last)
            .invoke(&topology, &identity, "put", &["{}".to_string()])
            .await;
        match result {
            Err(LedgerError::EndorsementFailed { failed, total, detail }) => {
                assert_eq!((failed, total), (0, 0));
                assert_eq!(detail, "no peers answered");
            }
            other => panic!("expected endorsement failure, got {other:?}"),
        }
        assert!(orderer.broadcasts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn invoke_is_not_retried() {
        let flaky = Arc::new(FakePeer::new("peerA", ProposalStatus::Success, "").flaky(1));
        let orderer = Arc::new(FakeOrderer::default());
        let topology = topology(vec![flaky.clone()], orderer.clone());
        let identity = topology.client().clone();

        let result = gateway(ResultSelection::Last)
            .invoke(&topology, &identity, "put", &["{}".to_string()])
            .await;
        assert!(matches!(result, Err(LedgerError::EndorsementFailed { .. })));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_endorsement_submits_exactly_once_and_commits() {
        let peers = vec![
            Arc::new(FakePeer::new("peerA", ProposalStatus::Success, "")),
            Arc::new(FakePeer::new("peerB", ProposalStatus::Success, "")),
        ];
        let orderer = Arc::new(FakeOrderer {
            commit_delay: Duration::from_millis(20),
            ..FakeOrderer::default()
        });
        let topology = topology(peers.clone(), orderer.clone());
        let identity = topology.client().clone();

        let mut outcome = gateway(ResultSelection::Last)
            .invoke(&topology, &identity, "put", &[r#"{"id":"widget-1"}"#.to_string()])
            .await
            .unwrap();

        assert!(outcome.accepted);
        assert_eq!(outcome.commit_status, CommitStatus::Pending);

        {
            let broadcasts = orderer.broadcasts.lock().await;
            assert_eq!(broadcasts.len(), 1);
            let envelope = &broadcasts[0];
            assert_eq!(envelope.transaction_id, outcome.transaction_id);
            let mut endorsers: Vec<_> =
                envelope.endorsements.iter().map(|r| r.peer_id.as_str()).collect();
            endorsers.sort();
            assert_eq!(endorsers, vec!["peerA", "peerB"]);
            assert!(envelope.endorsements.iter().all(ProposalResponse::is_success));
        }

        let seen = peers[0].seen.lock().await;
        assert_eq!(seen[0].chaincode_id, "commodity");
        assert!(!seen[0].read_only);
        drop(seen);

        let status = outcome.wait_for_commit(Duration::from_secs(1)).await.unwrap();
        assert_eq!(status, CommitStatus::Committed);
        assert_eq!(outcome.commit_status, CommitStatus::Committed);
        // Second wait returns the recorded status.
        assert_eq!(
            outcome.wait_for_commit(Duration::ZERO).await.unwrap(),
            CommitStatus::Committed
        );
    }

    #[tokio::test]
    async fn invalidated_transaction_reports_failed() {
        let peers = vec![Arc::new(FakePeer::new("peerA", ProposalStatus::Success, ""))];
        let orderer = Arc::new(FakeOrderer {
            invalid: true,
            ..FakeOrderer::default()
        });
        let topology = topology(peers, orderer);
        let identity = topology.client().clone();

        let mut outcome = gateway(ResultSelection::Last)
            .invoke(&topology, &identity, "put", &["{}".to_string()])
            .await
            .unwrap();
        assert_eq!(
            outcome.wait_for_commit(Duration::from_secs(1)).await.unwrap(),
            CommitStatus::Failed
        );
    }

    #[tokio::test]
    async fn commit_wait_times_out() {
        let peers = vec![Arc::new(FakePeer::new("peerA", ProposalStatus::Success, ""))];
        let orderer = Arc::new(FakeOrderer {
            commit_delay: Duration::from_secs(5),
            ..FakeOrderer::default()
        });
        let topology = topology(peers, orderer);
        let identity = topology.client().clone();

        let outcome = gateway(ResultSelection::Last)
            .invoke(&topology, &identity, "put", &["{}".to_string()])
            .await
            .unwrap();
        let tx_id = outcome.transaction_id.clone();
        let handle = outcome.into_commit_handle().unwrap();

        let result = handle.wait(Duration::from_millis(20)).await;
        assert!(matches!(
            result,
            Err(LedgerError::CommitTimeout { transaction_id, .. }) if transaction_id == tx_id
        ));
    }

    #[tokio::test]
    async fn orderer_rejection_is_proposal_error_without_retry() {
        let peers = vec![Arc::new(FakePeer::new("peerA", ProposalStatus::Success, ""))];
        let orderer = Arc::new(FakeOrderer {
            reject: true,
            ..FakeOrderer::default()
        });
        let topology = topology(peers, orderer.clone());
        let identity = topology.client().clone();

        let result = gateway(ResultSelection::Last)
            .invoke(&topology, &identity, "put", &["{}".to_string()])
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::Proposal { operation: "ordering submission", .. })
        ));
        assert_eq!(orderer.broadcasts.lock().await.len(), 1);
    }
}
