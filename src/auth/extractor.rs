// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user.user_id is the ledger identity to act as
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Validation};

use super::claims::IdTokenClaims;
use super::{AuthError, AuthenticatedUser, JwksManager};
use crate::state::{AppState, AuthConfig};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Requires a valid identity-provider ID token.
///
/// ## Verification Modes
///
/// - **Production** (JWKS configured): signature, expiry and user-pool issuer
/// - **Development** (`IDP_JWKS_URL=insecure-dev`): structure and expiry only
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;

        let claims = verify_id_token(token, &state.auth_config).await?;
        let user = AuthenticatedUser::from_claims(claims);
        tracing::debug!(user_id = %user.user_id, "Request authenticated");

        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

async fn verify_id_token(token: &str, auth_config: &AuthConfig) -> Result<IdTokenClaims, AuthError> {
    match &auth_config.jwks {
        Some(jwks) => verify_with_jwks(token, jwks, auth_config.issuer.as_deref()).await,
        None => decode_unverified(token),
    }
}

async fn verify_with_jwks(
    token: &str,
    jwks: &JwksManager,
    issuer: Option<&str>,
) -> Result<IdTokenClaims, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

    let (decoding_key, algorithm) = match &header.kid {
        Some(kid) => jwks.get_decoding_key(kid).await?,
        None => jwks.get_any_decoding_key().await?,
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    // ID token audience is the app client id, which the gateway does not pin.
    validation.validate_aud = false;
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }

    decode::<IdTokenClaims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        })
}

/// Development decoding: no signature check.
fn decode_unverified(token: &str) -> Result<IdTokenClaims, AuthError> {
    let claims = jsonwebtoken::dangerous::insecure_decode::<IdTokenClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?
        .claims;

    let now = chrono::Utc::now().timestamp();
    if claims.exp > 0 && claims.exp < now - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }
    Ok(claims)
}
