// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request bodies accepted by the ledger endpoints. The chaincode receives
//! the commodity as a single JSON string argument, serialized from
//! [`Commodity`] exactly as documented here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A commodity record written to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Commodity {
    /// Ledger key of the record
    #[schema(example = "widget-1")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Copper cathode")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 25.5)]
    pub quantity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "t")]
    pub unit: Option<String>,

    /// Free-form attributes passed through to the chaincode
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Commodity {
    /// Chaincode argument form.
    pub fn to_chaincode_arg(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
