// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client Configuration
//!
//! Credentials, endpoints and tuning knobs for [`VerificationClient`].
//! A configuration is built once and never mutated after the client is
//! constructed.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DIDIT_CLIENT_ID` | OAuth2 client ID | Required |
//! | `DIDIT_CLIENT_SECRET` | OAuth2 client secret | Required |
//! | `DIDIT_BASE_URL` | Verification API base URL | `https://verification.didit.me` |
//! | `DIDIT_AUTH_URL` | Auth server base URL | `https://apx.didit.me` |
//! | `DIDIT_WEBHOOK_SECRET` | Shared secret for webhook HMACs | Optional |
//! | `DIDIT_TIMEOUT` | Per-request timeout in seconds | `10` |
//! | `DIDIT_TOKEN_EXPIRY_BUFFER` | Seconds before expiry to refresh the token | `300` |
//! | `DIDIT_DEBUG` | Emit debug traces of requests and payloads | `false` |
//!
//! [`VerificationClient`]: crate::VerificationClient

use std::{fmt, time::Duration};

use url::Url;

use crate::error::{DiditError, Result};

pub const DEFAULT_BASE_URL: &str = "https://verification.didit.me";
pub const DEFAULT_AUTH_URL: &str = "https://apx.didit.me";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_TOKEN_EXPIRY_BUFFER_SECONDS: u64 = 300;

pub const CLIENT_ID_ENV: &str = "DIDIT_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "DIDIT_CLIENT_SECRET";
pub const BASE_URL_ENV: &str = "DIDIT_BASE_URL";
pub const AUTH_URL_ENV: &str = "DIDIT_AUTH_URL";
pub const WEBHOOK_SECRET_ENV: &str = "DIDIT_WEBHOOK_SECRET";
pub const TIMEOUT_ENV: &str = "DIDIT_TIMEOUT";
pub const TOKEN_EXPIRY_BUFFER_ENV: &str = "DIDIT_TOKEN_EXPIRY_BUFFER";
pub const DEBUG_ENV: &str = "DIDIT_DEBUG";

/// Configuration for a single credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub auth_url: String,
    pub webhook_secret: Option<String>,
    pub timeout_seconds: u64,
    pub token_expiry_buffer_seconds: u64,
    pub debug: bool,
}

impl ClientConfig {
    /// Create a configuration with default endpoints and timings.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            webhook_secret: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            token_expiry_buffer_seconds: DEFAULT_TOKEN_EXPIRY_BUFFER_SECONDS,
            debug: false,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_token_expiry_buffer_seconds(mut self, seconds: u64) -> Self {
        self.token_expiry_buffer_seconds = seconds;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Load the configuration from `DIDIT_*` environment variables.
    ///
    /// Missing optional values fall back to their defaults. Required values
    /// are checked later by [`ClientConfig::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Values are trimmed and blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::new(
            read(CLIENT_ID_ENV).unwrap_or_default(),
            read(CLIENT_SECRET_ENV).unwrap_or_default(),
        );
        if let Some(base_url) = read(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        if let Some(auth_url) = read(AUTH_URL_ENV) {
            config.auth_url = auth_url;
        }
        config.webhook_secret = read(WEBHOOK_SECRET_ENV);
        if let Some(raw) = read(TIMEOUT_ENV) {
            config.timeout_seconds = parse_seconds(TIMEOUT_ENV, &raw)?;
        }
        if let Some(raw) = read(TOKEN_EXPIRY_BUFFER_ENV) {
            config.token_expiry_buffer_seconds = parse_seconds(TOKEN_EXPIRY_BUFFER_ENV, &raw)?;
        }
        if let Some(raw) = read(DEBUG_ENV) {
            config.debug = parse_flag(DEBUG_ENV, &raw)?;
        }

        Ok(config)
    }

    /// Check that credentials and endpoints are usable.
    pub fn validate(&self) -> Result<()> {
        require("client_id", &self.client_id)?;
        require("client_secret", &self.client_secret)?;
        require("base_url", &self.base_url)?;
        require("auth_url", &self.auth_url)?;
        require_absolute_url("base_url", &self.base_url)?;
        require_absolute_url("auth_url", &self.auth_url)?;

        if self.timeout_seconds == 0 {
            return Err(DiditError::Config(
                "timeout must be a positive number of seconds".to_string(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Base URL without a trailing slash.
    pub(crate) fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Auth URL without a trailing slash.
    pub(crate) fn auth_root(&self) -> &str {
        self.auth_url.trim_end_matches('/')
    }
}

// Secrets stay out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("auth_url", &self.auth_url)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("timeout_seconds", &self.timeout_seconds)
            .field(
                "token_expiry_buffer_seconds",
                &self.token_expiry_buffer_seconds,
            )
            .field("debug", &self.debug)
            .finish()
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DiditError::Config(format!("{field} is required")));
    }
    Ok(())
}

fn require_absolute_url(field: &str, value: &str) -> Result<()> {
    let parsed = Url::parse(value)
        .map_err(|e| DiditError::Config(format!("{field} is not a valid URL: {e}")))?;
    if parsed.cannot_be_a_base() {
        return Err(DiditError::Config(format!("{field} must be an absolute URL")));
    }
    Ok(())
}

fn parse_seconds(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|_| DiditError::Config(format!("{name} must be a whole number of seconds")))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DiditError::Config(format!("{name} must be a boolean"))),
    }
}
