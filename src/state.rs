// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared handles every request builds its ledger pipeline from.

use std::sync::Arc;

use crate::auth::{AuthError, JwksManager};
use crate::config::{GatewayConfig, TokenVerification};
use crate::ledger::{
    CaError, CertificateAuthority, EnrollmentLocks, FabricCaClient, HttpConnector,
    IdentityManager, LedgerConnector, LedgerError, LedgerResult, TopologyBuilder,
    TransactionGateway,
};
use crate::storage::{CredentialStore, ObjectStore};

pub type CaResult = Result<Arc<dyn CertificateAuthority>, CaError>;

/// Builds a CA adapter bound to the network trust material.
pub type CaConnector = Arc<dyn Fn(&[u8]) -> CaResult + Send + Sync>;

/// ID token verification settings.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// `None` means development mode (no signature check)
    pub jwks: Option<JwksManager>,
    pub issuer: Option<String>,
}

impl AuthConfig {
    pub fn from_verification(verification: &TokenVerification) -> Result<Self, AuthError> {
        match verification {
            TokenVerification::Jwks { jwks_url, issuer } => Ok(Self {
                jwks: Some(JwksManager::new(jwks_url.as_str())?),
                issuer: Some(issuer.clone()),
            }),
            TokenVerification::InsecureDev => Ok(Self::default()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub objects: Arc<dyn ObjectStore>,
    pub connector: Arc<dyn LedgerConnector>,
    pub ca_connector: CaConnector,
    pub locks: EnrollmentLocks,
    pub auth_config: AuthConfig,
}

impl AppState {
    /// Production wiring: HTTP transports and the REST certificate authority.
    pub fn new(config: Arc<GatewayConfig>, objects: Arc<dyn ObjectStore>) -> Result<Self, AuthError> {
        let auth_config = AuthConfig::from_verification(&config.identity_provider.verification)?;
        let connector = Arc::new(HttpConnector::new(config.network_timeout, config.commit_timeout));

        let ca_url = config.ca_url.clone();
        let timeout = config.network_timeout;
        let ca_connector: CaConnector = Arc::new(move |trust: &[u8]| -> CaResult {
            let client = FabricCaClient::new(&ca_url, Some(trust), timeout)?;
            Ok(Arc::new(client) as Arc<dyn CertificateAuthority>)
        });

        Ok(Self {
            config,
            objects,
            connector,
            ca_connector,
            locks: EnrollmentLocks::new(),
            auth_config,
        })
    }

    pub fn with_connector(mut self, connector: Arc<dyn LedgerConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_ca_connector(mut self, ca_connector: CaConnector) -> Self {
        self.ca_connector = ca_connector;
        self
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn topology_builder(&self) -> TopologyBuilder {
        TopologyBuilder::new(
            self.objects.clone(),
            self.connector.clone(),
            self.config.channel.clone(),
            self.config.network_timeout,
        )
    }

    /// Identity manager whose CA adapter trusts `trust_material`.
    pub fn identity_manager(&self, trust_material: &[u8]) -> LedgerResult<IdentityManager> {
        let ca = (self.ca_connector)(trust_material)
            .map_err(|e| LedgerError::setup("certificate authority client", e))?;

        Ok(IdentityManager::new(
            CredentialStore::new(self.objects.clone()),
            ca,
            self.locks.clone(),
            self.config.msp_id.clone(),
            self.config.ca_admin.clone(),
            self.config.network_timeout,
        ))
    }

    pub fn gateway(&self) -> TransactionGateway {
        TransactionGateway::new(Arc::new(self.config.gateway_settings()))
    }
}
