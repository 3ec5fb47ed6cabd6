// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ledger::{ErrorClass, LedgerError};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Business failures take `business_status`; gateway faults are always 500.
    ///
    /// `context` prefixes the message, e.g. "Error while enrolling user".
    pub fn from_ledger(err: &LedgerError, business_status: StatusCode, context: &str) -> Self {
        let status = match err.class() {
            ErrorClass::Business => business_status,
            ErrorClass::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, format!("{context} - {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        assert_eq!(ApiError::forbidden("no").status, StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::internal("boom").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn ledger_errors_map_by_class() {
        let rejected = LedgerError::EndorsementFailed {
            failed: 1,
            total: 2,
            detail: "nd-2: invalid commodity".into(),
        };
        let err = ApiError::from_ledger(&rejected, StatusCode::FORBIDDEN, "Error while invoking chaincode");
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(err.message.starts_with("Error while invoking chaincode - Endorsement rejected"));

        let topology = LedgerError::TopologyInit("TLS trust material missing".into());
        let err = ApiError::from_ledger(&topology, StatusCode::FORBIDDEN, "Error while invoking chaincode");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);

        let enrollment = LedgerError::enrollment("alice", "CA rejected enroll");
        let err = ApiError::from_ledger(&enrollment, StatusCode::BAD_REQUEST, "Error while enrolling user");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
