// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Models
//!
//! Session resources are passed through as generic JSON objects so fields the
//! client does not interpret (`vendor_data`, extra session options, decision
//! details) survive untouched. Only values the client itself validates get a
//! dedicated type.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::DiditError;

/// Ordered string-keyed JSON object.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Session Status
// =============================================================================

/// Manual review outcome accepted by the update-status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Approved,
    Declined,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Approved => "Approved",
            SessionStatus::Declined => "Declined",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match.
impl FromStr for SessionStatus {
    type Err = DiditError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Approved" => Ok(SessionStatus::Approved),
            "Declined" => Ok(SessionStatus::Declined),
            _ => Err(DiditError::Validation(
                "newStatus must be either \"Approved\" or \"Declined\"".to_string(),
            )),
        }
    }
}
