// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the DiDiT client.
//!
//! Every wrap keeps the original cause reachable through
//! [`std::error::Error::source`] and adds one layer of operation context.

use reqwest::StatusCode;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = DiditError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DiditError {
    /// Missing or malformed configuration. Not retryable.
    #[error("DiDiT configuration error: {0}")]
    Config(String),

    /// Client-credential exchange with the auth server failed.
    #[error("DiDiT authentication error: {message}")]
    Auth {
        message: String,
        status: Option<StatusCode>,
        #[source]
        source: Option<BoxError>,
    },

    /// An authenticated API call failed.
    #[error("DiDiT {context} error: {message}")]
    Api {
        context: String,
        message: String,
        status: Option<StatusCode>,
        #[source]
        source: Option<BoxError>,
    },

    /// Caller input was rejected before anything was sent or trusted.
    #[error("{0}")]
    Validation(String),

    /// A body that should have been a JSON object could not be decoded.
    #[error("DiDiT {context} error: malformed JSON payload: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DiditError {
    pub(crate) fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub(crate) fn auth_transport(error: reqwest::Error) -> Self {
        Self::Auth {
            message: error.to_string(),
            status: error.status(),
            source: Some(Box::new(error)),
        }
    }

    pub(crate) fn api_transport(context: &str, error: reqwest::Error) -> Self {
        Self::Api {
            context: context.to_string(),
            message: error.to_string(),
            status: error.status(),
            source: Some(Box::new(error)),
        }
    }

    pub(crate) fn decode(context: &str, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.to_string(),
            source,
        }
    }

    /// Re-home an authentication failure under the operation that needed the
    /// token. Other variants already carry their own context.
    pub(crate) fn within(self, context: &str) -> Self {
        match self {
            auth @ Self::Auth { .. } => {
                let message = auth.to_string();
                let status = auth.status();
                Self::Api {
                    context: context.to_string(),
                    message,
                    status,
                    source: Some(Box::new(auth)),
                }
            }
            other => other,
        }
    }

    /// HTTP status returned by the remote side, when there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Auth { status, .. } | Self::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Operation context (e.g. `session creation`) for API and decode errors.
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Api { context, .. } | Self::Decode { context, .. } => Some(context.as_str()),
            Self::Auth { .. } => Some("authentication"),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
