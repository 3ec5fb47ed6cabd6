// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ID token claims and the authenticated principal.

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Username prefix the identity provider assigns to federated Google logins.
const FEDERATED_PREFIX: &str = "google";

/// Claims carried by an identity-provider ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    /// Subject (stable pool-local user id)
    pub sub: String,

    #[serde(default, rename = "cognito:username")]
    pub username: Option<String>,

    #[serde(default, rename = "cognito:groups", deserialize_with = "groups")]
    pub groups: Vec<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Display name (`name`), falling back to `given_name`
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub given_name: Option<String>,

    #[serde(default)]
    pub family_name: Option<String>,

    #[serde(default)]
    pub phone_number: Option<String>,

    #[serde(default)]
    pub iss: String,

    #[serde(default)]
    pub exp: i64,
}

/// `cognito:groups` arrives as a JSON list from the provider and as a comma
/// separated string from some API gateway authorizers.
fn groups<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Groups {
        List(Vec<String>),
        Joined(String),
    }

    let raw = match Option::<Groups>::deserialize(deserializer)? {
        None => return Ok(Vec::new()),
        Some(Groups::List(list)) => list,
        Some(Groups::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(raw
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect())
}

/// Authenticated principal extracted from a verified ID token.
///
/// `user_id` is the ledger identity the request acts as.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub groups: Vec<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    /// Token issuer
    pub issuer: String,
    /// Token expiration timestamp
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Federated logins are keyed by username, native pool users by `sub`.
    pub fn from_claims(claims: IdTokenClaims) -> Self {
        let user_id = match claims.username {
            Some(username) if username.starts_with(FEDERATED_PREFIX) => username,
            _ => claims.sub,
        };

        Self {
            user_id,
            groups: claims.groups,
            email: claims.email,
            first_name: claims.name.or(claims.given_name),
            last_name: claims.family_name,
            phone: claims.phone_number,
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}
