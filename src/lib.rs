// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger Gateway - Permissioned Ledger Access Service
//!
//! HTTP gateway that enrolls identity-provider users on a managed
//! permissioned ledger network and queries or invokes chaincode as them.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - ID token verification and the authenticated principal
//! - `config` - Environment configuration
//! - `ledger` - Enrollment, channel topology and transaction gateway
//! - `storage` - Credential object store

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod state;
pub mod storage;
