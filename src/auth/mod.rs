// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Maps identity-provider ID tokens to the ledger identity a request acts as.
//!
//! ## Auth Flow
//!
//! 1. The client signs in against the user pool
//! 2. The client sends `Authorization: Bearer <ID token>`
//! 3. The gateway:
//!    - Fetches the pool JWKS via HTTPS (cached for 5 minutes)
//!    - Verifies signature, expiry and issuer
//!    - Extracts the user id (`cognito:username` for federated logins, else `sub`)
//!
//! Health and documentation endpoints are public; every `/api` route requires a token.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;

pub use claims::{AuthenticatedUser, IdTokenClaims};
pub use error::AuthError;
pub use extractor::Auth;
pub use jwks::JwksManager;
