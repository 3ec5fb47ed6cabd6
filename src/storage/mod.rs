// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Storage Module
//!
//! Enrollment material for every identity the gateway acts as, kept in an
//! object bucket addressed by `/`-separated keys.
//!
//! ## Storage Layout
//!
//! ```text
//! {bucket}/
//!   {org}/
//!     admin-msp/
//!       keystore/pk          # Registrar private key
//!       signcerts/cert.pem   # Registrar certificate
//!     {user_id}/
//!       keystore/pk
//!       signcerts/cert.pem
//!   {ledger_tls_cert_name}   # PEM trust material for CA, peers and orderer
//! ```
//!
//! ## Backends
//!
//! - [`FsObjectStore`]: a directory tree on local disk (or a mounted bucket)
//! - [`S3ObjectStore`]: an S3 bucket (or an S3-compatible service)
//! - [`MemoryObjectStore`]: process-local map for tests and ephemeral runs
//!
//! ## Important Notes
//!
//! - Private keys are never returned by any HTTP endpoint
//! - Enrollment writes are create-if-absent; existing records are never replaced

pub mod credentials;
pub mod object_store;
pub mod paths;
pub mod s3;

pub use credentials::CredentialStore;
pub use object_store::{FsObjectStore, MemoryObjectStore, ObjectStore, StorageError, StorageResult};
pub use paths::{ArtifactKind, CredentialPaths, ADMIN_STORAGE_ID};
pub use s3::S3ObjectStore;
