// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential store: per-identity enrollment material in the object store.
//!
//! ## Storage Layout
//!
//! ```text
//! {org}/{user_id}/keystore/pk          # base64 PKCS#8 DER private key
//! {org}/{user_id}/signcerts/cert.pem   # PEM certificate
//! ```
//!
//! The private key is located by listing `{org}/{user_id}/keystore/`. Exactly
//! one object must match; zero or several matches are both reported as
//! [`StorageError::NotFound`]. An ambiguous keystore is treated as absent, not
//! resolved by picking one.
//!
//! Records are never updated by the enrollment path: it writes with
//! [`CredentialStore::create`], which refuses to replace an existing object.

use std::sync::Arc;

use super::object_store::{ObjectStore, StorageError, StorageResult};
use super::paths::{ArtifactKind, CredentialPaths};
use crate::ledger::crypto::{decode_private_key, encode_private_key};
use crate::ledger::retry::{retry_idempotent, RetryPolicy};
use crate::ledger::Enrollment;

/// Typed access to enrollment material.
#[derive(Clone)]
pub struct CredentialStore {
    objects: Arc<dyn ObjectStore>,
    paths: CredentialPaths,
    read_retry: RetryPolicy,
}

impl CredentialStore {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            objects,
            paths: CredentialPaths,
            read_retry: RetryPolicy::default(),
        }
    }

    /// Override the retry schedule applied to reads.
    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Backing object store (shared with the topology builder for trust material).
    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Read one artifact.
    pub async fn get(&self, org: &str, user_id: &str, kind: ArtifactKind) -> StorageResult<Vec<u8>> {
        let key = match kind {
            ArtifactKind::Certificate => self.paths.certificate(org, user_id),
            ArtifactKind::PrivateKey => self.list_one(org, user_id).await?,
        };
        self.read(&key).await
    }

    /// Write (or overwrite) one artifact.
    pub async fn put(
        &self,
        org: &str,
        user_id: &str,
        kind: ArtifactKind,
        data: &[u8],
    ) -> StorageResult<()> {
        let key = self.paths.artifact(org, user_id, kind);
        tracing::debug!(key = %key, artifact = %kind, "Writing credential");
        self.objects.put(&key, data).await
    }

    /// Write one artifact only if none exists at its key.
    pub async fn create(
        &self,
        org: &str,
        user_id: &str,
        kind: ArtifactKind,
        data: &[u8],
    ) -> StorageResult<()> {
        let key = self.paths.artifact(org, user_id, kind);
        tracing::debug!(key = %key, artifact = %kind, "Creating credential");
        self.objects.put_if_absent(&key, data).await
    }

    /// Resolve the single private key object under the identity's keystore.
    pub async fn list_one(&self, org: &str, user_id: &str) -> StorageResult<String> {
        let prefix = self.paths.keystore_prefix(org, user_id);
        let mut keys = retry_idempotent(
            "credential list",
            &self.read_retry,
            StorageError::is_transient,
            || self.objects.list(&prefix),
        )
        .await?;

        if keys.len() != 1 {
            tracing::debug!(
                prefix = %prefix,
                matches = keys.len(),
                "Key not found or multiple private keys registered"
            );
            return Err(StorageError::NotFound(prefix));
        }
        Ok(keys.remove(0))
    }

    /// Load both artifacts and rebuild the enrollment.
    pub async fn load_enrollment(&self, org: &str, user_id: &str) -> StorageResult<Enrollment> {
        let key_text = self.get(org, user_id, ArtifactKind::PrivateKey).await?;
        let certificate = self.get(org, user_id, ArtifactKind::Certificate).await?;

        let signing_key = decode_private_key(&key_text)
            .map_err(|e| StorageError::Corrupted(format!("{org}/{user_id}: {e}")))?;
        let certificate_pem = String::from_utf8(certificate)
            .map_err(|_| StorageError::Corrupted(format!("{org}/{user_id}: certificate is not UTF-8")))?;

        Ok(Enrollment::new(signing_key, certificate_pem))
    }

    /// Persist a new enrollment: certificate first, then the private key.
    ///
    /// Both writes are create-if-absent. [`StorageError::AlreadyExists`] means
    /// another writer enrolled this identity first.
    pub async fn store_enrollment(
        &self,
        org: &str,
        user_id: &str,
        enrollment: &Enrollment,
    ) -> StorageResult<()> {
        let key_text = encode_private_key(enrollment.signing_key())
            .map_err(|e| StorageError::Corrupted(e.to_string()))?;

        self.create(
            org,
            user_id,
            ArtifactKind::Certificate,
            enrollment.certificate_pem().as_bytes(),
        )
        .await?;
        self.create(org, user_id, ArtifactKind::PrivateKey, key_text.as_bytes())
            .await
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        retry_idempotent(
            "credential read",
            &self.read_retry,
            StorageError::is_transient,
            || self.objects.get(key),
        )
        .await
    }
}
