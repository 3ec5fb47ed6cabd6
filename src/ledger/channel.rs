// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request channel topology.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::error::{LedgerError, LedgerResult};
use super::retry::{retry_idempotent, RetryPolicy};
use super::transport::{EndorsingPeer, LedgerConnector, OrderingService, TransportError};
use super::types::{Identity, OrdererEndpoint, PeerEndpoint};
use crate::storage::{ObjectStore, StorageError};

/// Static description of the channel, taken from configuration.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub channel_id: String,
    pub peers: Vec<PeerEndpoint>,
    pub orderer: OrdererEndpoint,
    /// Object key of the PEM trust material
    pub tls_cert_name: String,
}

/// A fully connected channel bound to the identity it was built for.
pub struct ChannelTopology {
    channel_id: String,
    peers: Vec<Arc<dyn EndorsingPeer>>,
    orderer: Arc<dyn OrderingService>,
    trust_material: Vec<u8>,
    client: Identity,
}

impl ChannelTopology {
    pub fn new(
        channel_id: impl Into<String>,
        peers: Vec<Arc<dyn EndorsingPeer>>,
        orderer: Arc<dyn OrderingService>,
        trust_material: Vec<u8>,
        client: Identity,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            peers,
            orderer,
            trust_material,
            client,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn peers(&self) -> &[Arc<dyn EndorsingPeer>] {
        &self.peers
    }

    pub fn orderer(&self) -> &Arc<dyn OrderingService> {
        &self.orderer
    }

    pub fn trust_material(&self) -> &[u8] {
        &self.trust_material
    }

    /// Identity whose client context the channel was built with.
    pub fn client(&self) -> &Identity {
        &self.client
    }
}

impl std::fmt::Debug for ChannelTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTopology")
            .field("channel_id", &self.channel_id)
            .field(
                "peers",
                &self.peers.iter().map(|p| p.id()).collect::<Vec<_>>(),
            )
            .field("orderer", &self.orderer.id())
            .field("client", &self.client.user_id)
            .finish()
    }
}

/// Builds [`ChannelTopology`] instances; never caches them.
pub struct TopologyBuilder {
    objects: Arc<dyn ObjectStore>,
    connector: Arc<dyn LedgerConnector>,
    settings: Arc<ChannelSettings>,
    network_timeout: Duration,
    read_retry: RetryPolicy,
}

impl TopologyBuilder {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        connector: Arc<dyn LedgerConnector>,
        settings: Arc<ChannelSettings>,
        network_timeout: Duration,
    ) -> Self {
        Self {
            objects,
            connector,
            settings,
            network_timeout,
            read_retry: RetryPolicy::default(),
        }
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Fetch the network trust material from the object store.
    pub async fn trust_material(&self) -> LedgerResult<Vec<u8>> {
        let name = self.settings.tls_cert_name.as_str();
        let fetch = retry_idempotent(
            "trust material fetch",
            &self.read_retry,
            StorageError::is_transient,
            || self.objects.get(name),
        );

        match tokio::time::timeout(self.network_timeout, fetch).await {
            Ok(Ok(material)) => Ok(material),
            Ok(Err(e)) => Err(LedgerError::TopologyInit(format!(
                "TLS trust material {name} unavailable: {e}"
            ))),
            Err(_) => Err(LedgerError::TopologyInit(format!(
                "TLS trust material {name} not fetched within {} ms",
                self.network_timeout.as_millis()
            ))),
        }
    }

    /// Connect every configured peer and the orderer for `identity`.
    ///
    /// Fails without returning anything if a single endpoint cannot be reached.
    pub async fn build(&self, identity: Identity) -> LedgerResult<ChannelTopology> {
        let trust_material = self.trust_material().await?;
        self.build_with(identity, trust_material).await
    }

    /// [`build`](Self::build) with trust material the caller already fetched.
    pub async fn build_with(
        &self,
        identity: Identity,
        trust_material: Vec<u8>,
    ) -> LedgerResult<ChannelTopology> {
        if self.settings.peers.is_empty() {
            return Err(LedgerError::TopologyInit("no peers configured".to_string()));
        }

        let trust = Arc::new(trust_material.clone());

        let mut connections = JoinSet::new();
        for (index, endpoint) in self.settings.peers.iter().cloned().enumerate() {
            let connector = self.connector.clone();
            let trust = trust.clone();
            let timeout = self.network_timeout;
            connections.spawn(async move {
                let result = bounded(timeout, &endpoint.url, connector.connect_peer(&endpoint, &trust)).await;
                (index, endpoint, result)
            });
        }

        let orderer_endpoint = &self.settings.orderer;
        let orderer = bounded(
            self.network_timeout,
            &orderer_endpoint.url,
            self.connector.connect_orderer(orderer_endpoint, &trust),
        )
        .await
        .map_err(|e| {
            LedgerError::TopologyInit(format!("orderer {} handshake failed: {e}", orderer_endpoint.id))
        })?;

        let mut peers: Vec<Option<Arc<dyn EndorsingPeer>>> = vec![None; self.settings.peers.len()];
        while let Some(joined) = connections.join_next().await {
            let (index, endpoint, result) = joined
                .map_err(|e| LedgerError::TopologyInit(format!("peer connection task failed: {e}")))?;
            let peer = result.map_err(|e| {
                LedgerError::TopologyInit(format!("peer {} handshake failed: {e}", endpoint.id))
            })?;
            peers[index] = Some(peer);
        }
        let peers: Vec<_> = peers.into_iter().flatten().collect();

        tracing::debug!(
            channel_id = %self.settings.channel_id,
            peers = peers.len(),
            user_id = %identity.user_id,
            "Channel initialized"
        );

        Ok(ChannelTopology::new(
            self.settings.channel_id.clone(),
            peers,
            orderer,
            trust_material,
            identity,
        ))
    }
}

async fn bounded<T>(
    timeout: Duration,
    endpoint: &str,
    connect: impl std::future::Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(timeout, connect)
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: format!("no handshake within {} ms", timeout.as_millis()),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::crypto::generate_signing_key;
    use crate::ledger::types::{CommitEvent, Enrollment, ProposalResponse};
    use crate::ledger::transport::{SignedProposal, TransactionEnvelope};
    use crate::storage::MemoryObjectStore;
    use async_trait::async_trait;
    use std::collections::HashSet;

    const TRUST: &[u8] = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    struct Stub(String);

    #[async_trait]
    impl EndorsingPeer for Stub {
        fn id(&self) -> &str {
            &self.0
        }

        async fn process_proposal(
            &self,
            _proposal: &SignedProposal,
        ) -> Result<ProposalResponse, TransportError> {
            unreachable!("topology tests never send proposals")
        }
    }

    #[async_trait]
    impl OrderingService for Stub {
        fn id(&self) -> &str {
            &self.0
        }

        async fn broadcast(&self, _envelope: &TransactionEnvelope) -> Result<(), TransportError> {
            unreachable!("topology tests never broadcast")
        }

        async fn wait_for_commit(&self, _tx: &str) -> Result<CommitEvent, TransportError> {
            unreachable!("topology tests never wait for commits")
        }
    }

    /// Connector that refuses the listed endpoint ids and records trust material seen.
    struct StubConnector {
        refuse: HashSet<String>,
        hang: HashSet<String>,
    }

    impl StubConnector {
        fn check(&self, id: &str, trust: &[u8]) -> Result<(), TransportError> {
            assert_eq!(trust, TRUST);
            if self.refuse.contains(id) {
                return Err(TransportError::Connect {
                    endpoint: id.to_string(),
                    reason: "handshake rejected".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LedgerConnector for StubConnector {
        async fn connect_peer(
            &self,
            endpoint: &PeerEndpoint,
            trust: &[u8],
        ) -> Result<Arc<dyn EndorsingPeer>, TransportError> {
            if self.hang.contains(&endpoint.id) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.check(&endpoint.id, trust)?;
            Ok(Arc::new(Stub(endpoint.id.clone())))
        }

        async fn connect_orderer(
            &self,
            endpoint: &OrdererEndpoint,
            trust: &[u8],
        ) -> Result<Arc<dyn OrderingService>, TransportError> {
            self.check(&endpoint.id, trust)?;
            Ok(Arc::new(Stub(endpoint.id.clone())))
        }
    }

    fn settings() -> Arc<ChannelSettings> {
        Arc::new(ChannelSettings {
            channel_id: "mychannel".into(),
            peers: vec![
                PeerEndpoint {
                    id: "peer1".into(),
                    url: "grpcs://peer1:30003".into(),
                },
                PeerEndpoint {
                    id: "peer2".into(),
                    url: "grpcs://peer2:30003".into(),
                },
            ],
            orderer: OrdererEndpoint {
                id: "n-1".into(),
                url: "grpcs://orderer:30001".into(),
            },
            tls_cert_name: "managedblockchain-tls-chain.pem".into(),
        })
    }

    fn identity() -> Identity {
        Identity::new(
            "alice",
            "org1",
            "Org1MSP",
            Enrollment::new(generate_signing_key(), "cert"),
        )
    }

    async fn builder(refuse: &[&str], hang: &[&str], with_trust: bool) -> TopologyBuilder {
        let objects = Arc::new(MemoryObjectStore::new());
        if with_trust {
            objects
                .put("managedblockchain-tls-chain.pem", TRUST)
                .await
                .unwrap();
        }
        let connector = StubConnector {
            refuse: refuse.iter().map(|s| s.to_string()).collect(),
            hang: hang.iter().map(|s| s.to_string()).collect(),
        };
        TopologyBuilder::new(
            objects,
            Arc::new(connector),
            settings(),
            Duration::from_millis(200),
        )
        .with_read_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn builds_all_endpoints_in_configured_order() {
        let topology = builder(&[], &[], true).await.build(identity()).await.unwrap();

        assert_eq!(topology.channel_id(), "mychannel");
        let ids: Vec<_> = topology.peers().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["peer1", "peer2"]);
        assert_eq!(topology.orderer().id(), "n-1");
        assert_eq!(topology.trust_material(), TRUST);
        assert_eq!(topology.client().user_id, "alice");
    }

    #[tokio::test]
    async fn missing_trust_material_is_topology_error() {
        let result = builder(&[], &[], false).await.build(identity()).await;
        assert!(matches!(result, Err(LedgerError::TopologyInit(msg)) if msg.contains("unavailable")));
    }

    #[tokio::test]
    async fn any_rejected_peer_fails_the_build() {
        let result = builder(&["peer2"], &[], true).await.build(identity()).await;
        assert!(matches!(result, Err(LedgerError::TopologyInit(msg)) if msg.contains("peer2")));
    }

    #[tokio::test]
    async fn rejected_orderer_fails_the_build() {
        let result = builder(&["n-1"], &[], true).await.build(identity()).await;
        assert!(matches!(result, Err(LedgerError::TopologyInit(msg)) if msg.contains("orderer")));
    }

    #[tokio::test]
    async fn hanging_handshake_times_out() {
        let result = builder(&[], &["peer1"], true).await.build(identity()).await;
        assert!(matches!(result, Err(LedgerError::TopologyInit(msg)) if msg.contains("no handshake")));
    }
}
