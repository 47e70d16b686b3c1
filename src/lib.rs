// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! DiDiT Client - Identity Verification API Client
//!
//! This crate talks to the DiDiT verification API with OAuth2
//! client-credential authentication and verifies the webhooks DiDiT sends
//! back.
//!
//! ## Modules
//!
//! - `client` - Token caching, authenticated dispatch and session operations
//! - `webhook` - HMAC-SHA256 webhook verification with replay window
//! - `config` - Credentials, endpoints and environment loading
//! - `server` - Axum router for receiving webhooks
//!
//! ## Example
//!
//! ```rust,no_run
//! use didit_client::{ClientConfig, JsonObject, VerificationClient};
//!
//! # async fn run() -> didit_client::Result<()> {
//! let client = VerificationClient::new(ClientConfig::new("client-id", "client-secret"))?;
//! let session = client
//!     .create_session("https://example.com/verified", Some("user-42".into()), JsonObject::new())
//!     .await?;
//! let decision = client
//!     .get_session(session["session_id"].as_str().unwrap_or_default())
//!     .await?;
//! # let _ = decision;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod webhook;

pub use client::{TokenState, VerificationClient};
pub use config::ClientConfig;
pub use error::{DiditError, Result};
pub use models::{JsonObject, SessionStatus};
pub use webhook::{WebhookEnvelope, WebhookVerifier};
