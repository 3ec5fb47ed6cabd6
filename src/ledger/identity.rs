// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity resolution and first-time enrollment.
//!
//! ## Flow
//!
//! ```text
//! resolve_or_enroll(user, org)
//!   ├─ stored credentials?  ── yes ──> Identity
//!   └─ no
//!      ├─ resolve_admin(org)            (same cache-or-enroll, stored under admin-msp)
//!      ├─ CA register(user, org, admin) ──> secret
//!      ├─ CA enroll(user, secret)       ──> key + certificate
//!      └─ store certificate, then key   (create-if-absent)
//! ```
//!
//! Each `(org, user)` pair is serialized through [`EnrollmentLocks`] within the
//! process. Across processes the create-if-absent writes decide the winner; a
//! loser (write conflict, or CA reporting a duplicate registration) re-reads the
//! store and returns the winner's credentials.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::ca::{CaError, CertificateAuthority};
use super::error::{LedgerError, LedgerResult};
use super::retry::{retry_idempotent, RetryPolicy};
use super::types::{Enrollment, Identity};
use crate::storage::{CredentialStore, StorageError, StorageResult, ADMIN_STORAGE_ID};

/// Idle lock entries are pruned once the registry grows past this size.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Process-wide registry of per-identity enrollment locks.
#[derive(Clone, Default)]
pub struct EnrollmentLocks {
    inner: Arc<Mutex<HashMap<(String, String), Arc<Mutex<()>>>>>,
}

impl EnrollmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the identity `storage_id` of `org`.
    pub async fn acquire(&self, org: &str, storage_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry((org.to_string(), storage_id.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// CA login of the organization's registrar.
#[derive(Clone)]
pub struct AdminLogin {
    pub login: String,
    pub secret: String,
}

impl std::fmt::Debug for AdminLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminLogin")
            .field("login", &self.login)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Resolves usable identities, enrolling them on first use.
pub struct IdentityManager {
    credentials: CredentialStore,
    ca: Arc<dyn CertificateAuthority>,
    locks: EnrollmentLocks,
    member_id: String,
    admin: AdminLogin,
    store_timeout: Duration,
    conflict_retry: RetryPolicy,
    enroll_retry: RetryPolicy,
}

impl IdentityManager {
    pub fn new(
        credentials: CredentialStore,
        ca: Arc<dyn CertificateAuthority>,
        locks: EnrollmentLocks,
        member_id: impl Into<String>,
        admin: AdminLogin,
        store_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            ca,
            locks,
            member_id: member_id.into(),
            admin,
            store_timeout,
            conflict_retry: RetryPolicy::default(),
            enroll_retry: RetryPolicy::default(),
        }
    }

    /// Override how long a race loser waits for the winner's records to appear.
    pub fn with_conflict_retry(mut self, policy: RetryPolicy) -> Self {
        self.conflict_retry = policy;
        self
    }

    /// Override the retry schedule for enrolling a freshly registered identity.
    pub fn with_enroll_retry(mut self, policy: RetryPolicy) -> Self {
        self.enroll_retry = policy;
        self
    }

    /// Return the stored identity for `user_id`, enrolling it first if needed.
    pub async fn resolve_or_enroll(&self, user_id: &str, org: &str) -> LedgerResult<Identity> {
        if user_id == ADMIN_STORAGE_ID {
            return Err(LedgerError::enrollment(
                user_id,
                "identity id is reserved for the organization registrar",
            ));
        }
        let _guard = self.locks.acquire(org, user_id).await;

        match self.load(org, user_id).await {
            Ok(enrollment) => {
                tracing::debug!(user_id = %user_id, org = %org, "User is already enrolled");
                return Ok(self.identity(user_id, org, enrollment));
            }
            Err(StorageError::NotFound(_)) => {
                tracing::info!(user_id = %user_id, org = %org, "Enrollment not found, enrolling user");
            }
            Err(e) => return Err(LedgerError::setup("credential lookup", e)),
        }

        let admin = self
            .resolve_admin(org)
            .await
            .map_err(|e| LedgerError::enrollment(user_id, format!("admin unavailable: {e}")))?;

        let secret = match self.ca.register(user_id, org, &admin).await {
            Ok(secret) => secret,
            Err(CaError::AlreadyRegistered(_)) => {
                tracing::warn!(
                    user_id = %user_id,
                    org = %org,
                    "Identity registered concurrently, reading stored credentials"
                );
                return self.reread_after_conflict(user_id, org, user_id).await;
            }
            Err(e) => return Err(LedgerError::enrollment(user_id, e)),
        };

        // The enrollment secret is never persisted.
        let enrollment = retry_idempotent(
            "enrollment of registered identity",
            &self.enroll_retry,
            |e: &CaError| matches!(e, CaError::Protocol(_)),
            || self.ca.enroll(user_id, &secret),
        )
        .await
        .map_err(|e| {
            tracing::error!(
                user_id = %user_id,
                org = %org,
                error = %e,
                "Identity registered but enrollment failed; the CA registration has no stored credentials"
            );
            LedgerError::enrollment(user_id, format!("registered but not enrolled: {e}"))
        })?;

        self.persist(user_id, org, user_id, enrollment).await
    }

    /// Return the organization's registrar identity, enrolling it once if needed.
    ///
    /// Stored under [`ADMIN_STORAGE_ID`]; the identity carries the CA login name.
    pub async fn resolve_admin(&self, org: &str) -> LedgerResult<Identity> {
        let login = self.admin.login.as_str();
        let _guard = self.locks.acquire(org, ADMIN_STORAGE_ID).await;

        match self.load(org, ADMIN_STORAGE_ID).await {
            Ok(enrollment) => {
                tracing::debug!(org = %org, "Admin context reconstructed from credential store");
                return Ok(self.identity(login, org, enrollment));
            }
            Err(StorageError::NotFound(_)) => {
                tracing::info!(org = %org, "No stored admin credentials, enrolling admin");
            }
            Err(e) => return Err(LedgerError::setup("admin credential lookup", e)),
        }

        let enrollment = self
            .ca
            .enroll(login, &self.admin.secret)
            .await
            .map_err(|e| LedgerError::enrollment(login, e))?;

        self.persist(login, org, ADMIN_STORAGE_ID, enrollment).await
    }

    /// Return the stored identity for `user_id` without enrolling it.
    pub async fn resolve_existing(&self, user_id: &str, org: &str) -> LedgerResult<Identity> {
        if user_id == ADMIN_STORAGE_ID {
            return Err(LedgerError::NotEnrolled {
                user_id: user_id.to_string(),
            });
        }
        match self.load(org, user_id).await {
            Ok(enrollment) => Ok(self.identity(user_id, org, enrollment)),
            Err(StorageError::NotFound(_)) => Err(LedgerError::NotEnrolled {
                user_id: user_id.to_string(),
            }),
            Err(e) => Err(LedgerError::setup("credential lookup", e)),
        }
    }

    async fn persist(
        &self,
        user_id: &str,
        org: &str,
        storage_id: &str,
        enrollment: Enrollment,
    ) -> LedgerResult<Identity> {
        let stored = self
            .bounded(self.credentials.store_enrollment(org, storage_id, &enrollment))
            .await;

        match stored {
            Ok(()) => {
                tracing::info!(user_id = %user_id, org = %org, "Stored enrollment credentials");
                Ok(self.identity(user_id, org, enrollment))
            }
            Err(StorageError::AlreadyExists(_)) => {
                tracing::warn!(
                    user_id = %user_id,
                    org = %org,
                    "Credentials written concurrently, discarding ours"
                );
                self.reread_after_conflict(user_id, org, storage_id).await
            }
            Err(e) => Err(LedgerError::enrollment(user_id, e)),
        }
    }

    /// Read the winner's records, giving an in-flight writer time to finish.
    async fn reread_after_conflict(
        &self,
        user_id: &str,
        org: &str,
        storage_id: &str,
    ) -> LedgerResult<Identity> {
        let enrollment = retry_idempotent(
            "enrollment conflict re-read",
            &self.conflict_retry,
            |e: &StorageError| matches!(e, StorageError::NotFound(_)) || e.is_transient(),
            || self.load(org, storage_id),
        )
        .await
        .map_err(|e| {
            tracing::error!(
                user_id = %user_id,
                org = %org,
                error = %e,
                "Enrollment conflict but no stored credentials found"
            );
            LedgerError::enrollment(user_id, format!("concurrent enrollment left no credentials: {e}"))
        })?;

        Ok(self.identity(user_id, org, enrollment))
    }

    async fn load(&self, org: &str, storage_id: &str) -> StorageResult<Enrollment> {
        self.bounded(self.credentials.load_enrollment(org, storage_id))
            .await
    }

    async fn bounded<T>(&self, op: impl Future<Output = StorageResult<T>>) -> StorageResult<T> {
        tokio::time::timeout(self.store_timeout, op)
            .await
            .unwrap_or_else(|_| {
                Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "credential store deadline exceeded",
                )))
            })
    }

    fn identity(&self, user_id: &str, org: &str, enrollment: Enrollment) -> Identity {
        Identity::new(user_id, org, self.member_id.as_str(), enrollment)
    }
}
