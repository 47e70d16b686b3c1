// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access-token acquisition and caching.
//!
//! ## Caching
//!
//! - One bearer token per client, held in memory for the process lifetime
//! - A cached token is served while `expires_at > now + buffer`
//! - The cache lock is held across a refresh, so concurrent callers wait for
//!   the single in-flight exchange instead of issuing their own

use base64ct::{Base64, Encoding};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::VerificationClient;
use crate::error::{DiditError, Result};

/// Lifetime assumed when the auth server omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

const TOKEN_PATH: &str = "/auth/v2/token/";

/// Cached bearer token.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct TokenCache {
    access_token: Option<String>,
    expires_at: Option<i64>,
}

impl TokenCache {
    fn valid_token(&self, now: i64, buffer: i64) -> Option<&str> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) if expires_at > now.saturating_add(buffer) => {
                Some(token.as_str())
            }
            _ => None,
        }
    }
}

/// Snapshot of the token cache reported by [`VerificationClient::token_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// The next call is served from the cache.
    Cached,
    /// A token exchange currently holds the cache.
    Refreshing,
    /// The next call has to fetch a new token.
    Cold,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
}

impl OAuthTokenResponse {
    /// `expires_in` as seconds; some deployments send it as a string.
    fn lifetime(&self) -> i64 {
        match &self.expires_in {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
    }
}

impl VerificationClient {
    /// Return a bearer token, fetching a new one if the cached token is
    /// missing or inside the expiry buffer.
    pub async fn get_access_token(&self) -> Result<String> {
        let mut cache = self.token_cache.lock().await;
        let now = self.clock.now();

        if let Some(token) = cache.valid_token(now, self.expiry_buffer()) {
            if self.config.debug {
                debug!(target: "didit", "Using cached access token");
            }
            return Ok(token.to_string());
        }

        if self.config.debug {
            debug!(target: "didit", "Fetching new access token");
        }

        let response = self.request_token().await.inspect_err(|e| {
            warn!(error = %e, "DiDiT token exchange failed");
        })?;

        let access_token = match response.access_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return Err(DiditError::auth("Invalid response from auth server")),
        };

        // Full overwrite, never merged with the previous entry.
        *cache = TokenCache {
            access_token: Some(access_token.clone()),
            expires_at: Some(now.saturating_add(response.lifetime())),
        };

        Ok(access_token)
    }

    /// Cache state as seen right now, without waiting on an in-flight refresh.
    pub fn token_state(&self) -> TokenState {
        let Ok(cache) = self.token_cache.try_lock() else {
            return TokenState::Refreshing;
        };
        match cache.valid_token(self.clock.now(), self.expiry_buffer()) {
            Some(_) => TokenState::Cached,
            None => TokenState::Cold,
        }
    }

    async fn request_token(&self) -> Result<OAuthTokenResponse> {
        let url = format!("{}{}", self.config.auth_root(), TOKEN_PATH);
        let credentials = Base64::encode_string(
            format!("{}:{}", self.config.client_id, self.config.client_secret).as_bytes(),
        );

        // `form` sets `application/x-www-form-urlencoded`.
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Basic {credentials}"))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(DiditError::auth_transport)?;

        if let Err(e) = response.error_for_status_ref().map(|_| ()) {
            if self.config.debug {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                debug!(target: "didit", %status, body = %body, "Auth error details");
            }
            return Err(DiditError::auth_transport(e));
        }

        let body = response.bytes().await.map_err(DiditError::auth_transport)?;
        serde_json::from_slice(&body).map_err(|e| DiditError::Auth {
            message: "Invalid response from auth server".to_string(),
            status: None,
            source: Some(Box::new(e)),
        })
    }

    fn expiry_buffer(&self) -> i64 {
        i64::try_from(self.config.token_expiry_buffer_seconds).unwrap_or(i64::MAX)
    }
}
