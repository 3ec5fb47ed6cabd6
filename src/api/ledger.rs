// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger API endpoints.
//!
//! Every request builds its own pipeline from [`AppState`]: identity
//! resolution, channel topology, then the transaction gateway. Business
//! failures map to 400 (403 on submit); gateway faults map to 500.

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::{
    auth::Auth,
    error::ApiError,
    ledger::{ChannelTopology, CommitStatus, LedgerError, LedgerResult},
    models::Commodity,
    state::AppState,
};

const REGISTER_CONTEXT: &str = "Error while enrolling user";
const QUERY_CONTEXT: &str = "Error while querying chaincode";
const SUBMIT_CONTEXT: &str = "Error while invoking chaincode";

/// Enrolled user's channel session; never enrolls.
async fn open_session(state: &AppState, user_id: &str) -> LedgerResult<ChannelTopology> {
    let builder = state.topology_builder();
    let trust_material = builder.trust_material().await?;
    let identity = state
        .identity_manager(&trust_material)?
        .resolve_existing(user_id, &state.config.org_name)
        .await?;
    builder.build_with(identity, trust_material).await
}

/// Enroll the caller on the ledger's certificate authority.
///
/// Idempotent: an already enrolled user gets `true` without contacting the CA.
#[utoipa::path(
    post,
    path = "/api/register",
    tag = "Ledger",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User enrolled", body = bool),
        (status = 400, description = "Enrollment rejected"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Gateway setup failed")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<bool>, ApiError> {
    let org = state.config.org_name.as_str();
    let enroll = async {
        let trust_material = state.topology_builder().trust_material().await?;
        state
            .identity_manager(&trust_material)?
            .resolve_or_enroll(&user.user_id, org)
            .await
    };

    match enroll.await {
        Ok(identity) => {
            tracing::info!(user_id = %identity.user_id, org = %org, "User enrolled");
            Ok(Json(true))
        }
        Err(e) => {
            tracing::error!(user_id = %user.user_id, error = %e, "{REGISTER_CONTEXT}");
            Err(ApiError::from_ledger(&e, StatusCode::BAD_REQUEST, REGISTER_CONTEXT))
        }
    }
}

/// Evaluate the configured query function with the raw request body as its argument.
#[utoipa::path(
    post,
    path = "/api/query",
    tag = "Ledger",
    request_body(content = String, description = "Chaincode argument", content_type = "text/plain"),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Chaincode query result", body = String),
        (status = 400, description = "Caller not enrolled"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Channel setup or proposal failed")
    )
)]
pub async fn query(
    State(state): State<AppState>,
    Auth(user): Auth,
    argument: String,
) -> Result<impl IntoResponse, ApiError> {
    let chaincode = &state.config.chaincode;
    let run = async {
        let topology = open_session(&state, &user.user_id).await?;
        state
            .gateway()
            .query(&topology, &chaincode.id, &chaincode.query_function, &argument)
            .await
    };

    match run.await {
        Ok(result) => Ok(([(CONTENT_TYPE, "application/json")], result)),
        Err(e) => {
            tracing::error!(
                user_id = %user.user_id,
                function = %chaincode.query_function,
                error = %e,
                "{QUERY_CONTEXT}"
            );
            Err(ApiError::from_ledger(&e, StatusCode::BAD_REQUEST, QUERY_CONTEXT))
        }
    }
}

/// Write a commodity record through the configured invoke function.
///
/// Returns once the ordering service accepted the transaction, or once it is
/// committed when `SUBMIT_WAIT_FOR_COMMIT` is set.
#[utoipa::path(
    post,
    path = "/api/submit/commodity",
    tag = "Ledger",
    request_body = Commodity,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transaction accepted", body = bool),
        (status = 400, description = "Invalid commodity record"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller not enrolled, endorsement rejected or transaction invalidated"),
        (status = 500, description = "Channel setup, ordering or commit wait failed")
    )
)]
pub async fn submit_commodity(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(commodity): Json<Commodity>,
) -> Result<Json<bool>, ApiError> {
    if commodity.id.trim().is_empty() {
        return Err(ApiError::bad_request("Commodity id must not be empty"));
    }
    let argument = commodity
        .to_chaincode_arg()
        .map_err(|e| ApiError::bad_request(format!("Invalid commodity record: {e}")))?;

    let function = state.config.chaincode.invoke_function.as_str();
    tracing::info!(
        user_id = %user.user_id,
        commodity_id = %commodity.id,
        function = %function,
        "Invoking chaincode"
    );

    let run = async {
        let topology = open_session(&state, &user.user_id).await?;
        let mut outcome = state
            .gateway()
            .invoke(&topology, topology.client(), function, &[argument])
            .await?;

        if state.config.submit_wait_for_commit {
            outcome.wait_for_commit(state.config.commit_timeout).await?;
        }
        Ok::<_, LedgerError>(outcome)
    };

    let outcome = run.await.map_err(|e| {
        tracing::error!(user_id = %user.user_id, error = %e, "{SUBMIT_CONTEXT}");
        ApiError::from_ledger(&e, StatusCode::FORBIDDEN, SUBMIT_CONTEXT)
    })?;

    if outcome.commit_status == CommitStatus::Failed {
        return Err(ApiError::forbidden(format!(
            "{SUBMIT_CONTEXT} - transaction {} was invalidated",
            outcome.transaction_id
        )));
    }

    tracing::info!(
        transaction_id = %outcome.transaction_id,
        commit_status = ?outcome.commit_status,
        "Commodity submitted"
    );
    Ok(Json(outcome.accepted))
}
