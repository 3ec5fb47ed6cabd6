// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the ledger pipeline.
//!
//! Every variant carries the operation and cause for logging. None of them
//! may carry key material or enrollment secrets.

use crate::storage::StorageError;

/// Whether an error reflects a ledger-side business outcome or a gateway fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Business,
    Infrastructure,
}

/// Errors surfaced by the identity manager, topology builder and gateway.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Enrollment failed for {user_id}: {reason}")]
    EnrollmentFailed { user_id: String, reason: String },

    #[error("User {user_id} is not enrolled")]
    NotEnrolled { user_id: String },

    #[error("Setup failed during {operation}: {reason}")]
    InfrastructureSetup {
        operation: &'static str,
        reason: String,
    },

    #[error("Channel initialization failed: {0}")]
    TopologyInit(String),

    #[error("Endorsement rejected by {failed} of {total} peers: {detail}")]
    EndorsementFailed {
        failed: usize,
        total: usize,
        detail: String,
    },

    #[error("Proposal failed during {operation}: {reason}")]
    Proposal {
        operation: &'static str,
        reason: String,
    },

    #[error("No commit notification for {transaction_id} within {timeout_ms} ms")]
    CommitTimeout {
        transaction_id: String,
        timeout_ms: u128,
    },
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::EnrollmentFailed { .. }
            | LedgerError::NotEnrolled { .. }
            | LedgerError::EndorsementFailed { .. } => ErrorClass::Business,
            LedgerError::InfrastructureSetup { .. }
            | LedgerError::TopologyInit(_)
            | LedgerError::Proposal { .. }
            | LedgerError::CommitTimeout { .. } => ErrorClass::Infrastructure,
        }
    }

    pub fn setup(operation: &'static str, reason: impl ToString) -> Self {
        LedgerError::InfrastructureSetup {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn proposal(operation: &'static str, reason: impl ToString) -> Self {
        LedgerError::Proposal {
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn enrollment(user_id: &str, reason: impl ToString) -> Self {
        LedgerError::EnrollmentFailed {
            user_id: user_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        LedgerError::setup("credential storage", e)
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_are_classified() {
        assert_eq!(
            LedgerError::enrollment("alice", "ca down").class(),
            ErrorClass::Business
        );
        assert_eq!(
            LedgerError::EndorsementFailed {
                failed: 1,
                total: 2,
                detail: "peer1: rejected".into()
            }
            .class(),
            ErrorClass::Business
        );
        assert_eq!(
            LedgerError::NotEnrolled {
                user_id: "bob".into()
            }
            .class(),
            ErrorClass::Business
        );
    }

    #[test]
    fn infrastructure_errors_are_classified() {
        assert_eq!(
            LedgerError::TopologyInit("no trust material".into()).class(),
            ErrorClass::Infrastructure
        );
        assert_eq!(
            LedgerError::proposal("query", "connection refused").class(),
            ErrorClass::Infrastructure
        );
        let storage: LedgerError =
            StorageError::Io(std::io::Error::other("disk gone")).into();
        assert_eq!(storage.class(), ErrorClass::Infrastructure);
    }

    #[test]
    fn messages_name_operation_and_cause() {
        let err = LedgerError::proposal("query broadcast", "timeout");
        assert_eq!(err.to_string(), "Proposal failed during query broadcast: timeout");
    }
}
