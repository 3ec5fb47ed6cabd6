// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Object key layout for enrollment material.
//!
//! ```text
//! {org}/{user_id}/keystore/pk          # private key (base64 PKCS#8 DER)
//! {org}/{user_id}/signcerts/cert.pem   # enrollment certificate
//! ```
//!
//! The admin identity lives under the sentinel user id [`ADMIN_STORAGE_ID`],
//! never under the CA login name.

use std::fmt;

/// Sentinel storage user id for the organization's CA registrar.
pub const ADMIN_STORAGE_ID: &str = "admin-msp";

/// File name used when writing a private key under the keystore prefix.
pub const PRIVATE_KEY_FILE: &str = "pk";

/// Certificate file name under `signcerts/`.
pub const CERTIFICATE_FILE: &str = "cert.pem";

/// The two artifacts persisted per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    PrivateKey,
    Certificate,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::PrivateKey => write!(f, "private key"),
            ArtifactKind::Certificate => write!(f, "certificate"),
        }
    }
}

/// Key construction for the credential bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialPaths;

impl CredentialPaths {
    /// Root prefix of one identity.
    pub fn identity_prefix(&self, org: &str, user_id: &str) -> String {
        format!("{org}/{user_id}/")
    }

    /// Prefix listed to locate the private key.
    pub fn keystore_prefix(&self, org: &str, user_id: &str) -> String {
        format!("{}keystore/", self.identity_prefix(org, user_id))
    }

    /// Key a freshly written private key is stored under.
    pub fn private_key(&self, org: &str, user_id: &str) -> String {
        format!("{}{PRIVATE_KEY_FILE}", self.keystore_prefix(org, user_id))
    }

    /// Key of the enrollment certificate.
    pub fn certificate(&self, org: &str, user_id: &str) -> String {
        format!(
            "{}signcerts/{CERTIFICATE_FILE}",
            self.identity_prefix(org, user_id)
        )
    }

    /// Write location for an artifact.
    pub fn artifact(&self, org: &str, user_id: &str, kind: ArtifactKind) -> String {
        match kind {
            ArtifactKind::PrivateKey => self.private_key(org, user_id),
            ArtifactKind::Certificate => self.certificate(org, user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_paths_follow_bucket_layout() {
        let paths = CredentialPaths;
        assert_eq!(paths.keystore_prefix("org1", "alice"), "org1/alice/keystore/");
        assert_eq!(paths.private_key("org1", "alice"), "org1/alice/keystore/pk");
        assert_eq!(
            paths.certificate("org1", "alice"),
            "org1/alice/signcerts/cert.pem"
        );
    }

    #[test]
    fn admin_paths_use_sentinel_id() {
        let paths = CredentialPaths;
        assert_eq!(
            paths.artifact("org1", ADMIN_STORAGE_ID, ArtifactKind::Certificate),
            "org1/admin-msp/signcerts/cert.pem"
        );
        assert_eq!(
            paths.artifact("org1", ADMIN_STORAGE_ID, ArtifactKind::PrivateKey),
            "org1/admin-msp/keystore/pk"
        );
    }
}
