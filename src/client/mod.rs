// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # DiDiT Verification Client
//!
//! Every API call first asks the token manager for a bearer token, then goes
//! through the authenticated dispatcher defined here. Webhook verification is
//! an independent entry point that never touches the token cache.
//!
//! ## Endpoints
//!
//! | Operation | Method | Path | Auth |
//! |-----------|--------|------|------|
//! | Token fetch | POST | `{auth_url}/auth/v2/token/` | Basic |
//! | Create session | POST | `{base_url}/v1/session/` | Bearer |
//! | Get session | GET | `{base_url}/v1/session/{id}/decision/` | Bearer |
//! | Update status | PATCH | `{base_url}/v1/session/{id}/update-status/` | Bearer |
//! | Generate PDF | GET | `{base_url}/v1/session/{id}/generate-pdf/` | Bearer |

use std::sync::Arc;

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Client, Method, Response,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::ClientConfig,
    error::{DiditError, Result},
    models::JsonObject,
    webhook::WebhookVerifier,
};

mod sessions;
mod token;

use token::TokenCache;
pub use token::TokenState;

/// Default context for dispatcher errors.
pub const DEFAULT_CONTEXT: &str = "API request";

const APPLICATION_JSON: &str = "application/json";

/// Client for one DiDiT credential pair.
///
/// Cloning is cheap and clones share the token cache.
#[derive(Debug, Clone)]
pub struct VerificationClient {
    config: Arc<ClientConfig>,
    http: Client,
    token_cache: Arc<Mutex<TokenCache>>,
    clock: Arc<dyn Clock>,
    webhooks: WebhookVerifier,
}

impl VerificationClient {
    /// Build a client, failing fast on missing credentials or endpoints.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DiditError::Config(format!("failed to build HTTP client: {e}")))?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let webhooks = WebhookVerifier::new(config.webhook_secret.clone(), clock.clone());

        Ok(Self {
            config: Arc::new(config),
            http,
            token_cache: Arc::new(Mutex::new(TokenCache::default())),
            clock,
            webhooks,
        })
    }

    /// Build a client from `DIDIT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Replace the time source used for token expiry and webhook freshness.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.webhooks = WebhookVerifier::new(self.config.webhook_secret.clone(), clock.clone());
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn webhooks(&self) -> &WebhookVerifier {
        &self.webhooks
    }

    /// Authenticated call whose response body is decoded as a JSON object.
    pub async fn request_json(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        headers: Option<HeaderMap>,
        context: &str,
    ) -> Result<JsonObject> {
        let response = self.dispatch(method, url, body, headers, context).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DiditError::api_transport(context, e))?;

        serde_json::from_slice(&bytes).map_err(|e| DiditError::decode(context, e))
    }

    /// Authenticated call whose response body is returned untouched.
    pub async fn request_bytes(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        headers: Option<HeaderMap>,
        context: &str,
    ) -> Result<Vec<u8>> {
        let response = self.dispatch(method, url, body, headers, context).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DiditError::api_transport(context, e))?;

        Ok(bytes.to_vec())
    }

    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        headers: Option<HeaderMap>,
        context: &str,
    ) -> Result<Response> {
        let token = self
            .get_access_token()
            .await
            .map_err(|e| e.within(context))?;

        let mut request_headers = HeaderMap::new();
        request_headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        request_headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        if let Some(extra) = headers {
            merge_headers(&mut request_headers, extra);
        }

        if self.config.debug {
            debug!(target: "didit", %method, url, context, "Sending authenticated request");
        }

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .headers(request_headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DiditError::api_transport(context, e))?;

        self.ensure_success(response, context).await
    }

    /// Turn a non-2xx response into an [`DiditError::Api`] carrying its status.
    async fn ensure_success(&self, response: Response, context: &str) -> Result<Response> {
        let Err(e) = response.error_for_status_ref().map(|_| ()) else {
            return Ok(response);
        };

        let status = response.status();
        warn!(%status, context, "DiDiT API request failed");
        if self.config.debug {
            let body = response.text().await.unwrap_or_default();
            debug!(target: "didit", %status, body = %body, "API error details");
        }

        Err(DiditError::api_transport(context, e))
    }
}

/// Caller headers win over defaults; multi-valued headers are kept whole.
fn merge_headers(defaults: &mut HeaderMap, extra: HeaderMap) {
    for name in extra.keys() {
        defaults.remove(name);
    }
    for (name, value) in extra.iter() {
        defaults.append(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    fn client_for(server: &Server) -> VerificationClient {
        let config = ClientConfig::new("id", "secret")
            .with_base_url(server.url())
            .with_auth_url(server.url())
            .with_debug(true);
        VerificationClient::new(config)
            .expect("client should build")
            .with_clock(Arc::new(ManualClock::new(1_700_000_000)))
    }

    async fn mock_token(server: &mut Server) -> mockito::Mock {
        server
            .mock("POST", "/auth/v2/token/")
            .with_status(200)
            .with_body(r#"{"access_token":"T","expires_in":3600}"#)
            .create_async()
            .await
    }

    #[test]
    fn new_rejects_missing_credentials() {
        let err = VerificationClient::new(ClientConfig::new("", "secret")).unwrap_err();
        assert!(matches!(err, DiditError::Config(ref m) if m == "client_id is required"));
    }

    #[test]
    fn merge_headers_overrides_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        defaults.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

        let mut extra = HeaderMap::new();
        extra.insert(ACCEPT, HeaderValue::from_static("application/pdf"));
        extra.append("x-trace", HeaderValue::from_static("a"));
        extra.append("x-trace", HeaderValue::from_static("b"));

        merge_headers(&mut defaults, extra);

        assert_eq!(defaults[ACCEPT], "application/pdf");
        assert_eq!(defaults[CONTENT_TYPE], APPLICATION_JSON);
        assert_eq!(defaults.get_all("x-trace").iter().count(), 2);
    }

    #[tokio::test]
    async fn request_json_sends_bearer_and_default_headers() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let api = server
            .mock("POST", "/v1/things/")
            .match_header("authorization", "Bearer T")
            .match_header("accept", APPLICATION_JSON)
            .match_header("content-type", APPLICATION_JSON)
            .match_header("x-custom", "1")
            .match_body(Matcher::Json(json!({ "a": 1 })))
            .with_status(201)
            .with_body(r#"{"id":"thing-1"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let mut headers = HeaderMap::new();
        headers.insert("x-custom", HeaderValue::from_static("1"));

        let body = json!({ "a": 1 });
        let url = format!("{}/v1/things/", server.url());
        let result = client
            .request_json(Method::POST, &url, Some(&body), Some(headers), DEFAULT_CONTEXT)
            .await
            .expect("request should succeed");

        api.assert_async().await;
        assert_eq!(result["id"], "thing-1");
    }

    #[tokio::test]
    async fn request_bytes_skips_json_decoding() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let _api = server
            .mock("GET", "/raw")
            .with_status(200)
            .with_body(b"\x00\x01not json")
            .create_async()
            .await;

        let client = client_for(&server);
        let url = format!("{}/raw", server.url());
        let bytes = client
            .request_bytes(Method::GET, &url, None, None, DEFAULT_CONTEXT)
            .await
            .expect("request should succeed");

        assert_eq!(bytes, b"\x00\x01not json");
    }

    #[tokio::test]
    async fn non_success_status_is_wrapped_with_context() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let _api = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body(r#"{"detail":"Not found."}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let url = format!("{}/missing", server.url());
        let err = client
            .request_json(Method::GET, &url, None, None, "session retrieval")
            .await
            .unwrap_err();

        assert!(matches!(err, DiditError::Api { .. }));
        assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
        assert_eq!(err.context(), Some("session retrieval"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn auth_failure_is_reported_under_the_calling_context() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/auth/v2/token/")
            .with_status(500)
            .create_async()
            .await;
        let api = server
            .mock("GET", "/anything")
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server);
        let url = format!("{}/anything", server.url());
        let err = client
            .request_json(Method::GET, &url, None, None, DEFAULT_CONTEXT)
            .await
            .unwrap_err();

        api.assert_async().await;
        assert_eq!(err.context(), Some(DEFAULT_CONTEXT));
        assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn stalled_request_times_out_under_the_calling_context() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server).await;

        // Accepts connections through the backlog but never answers.
        let stalled = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/v1/session/s-1/decision/", stalled.local_addr().unwrap());

        let config = ClientConfig::new("id", "secret")
            .with_base_url(server.url())
            .with_auth_url(server.url())
            .with_timeout_seconds(1);
        let client = VerificationClient::new(config)
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(1_700_000_000)));

        let err = client
            .request_json(Method::GET, &url, None, None, "session retrieval")
            .await
            .unwrap_err();

        assert!(matches!(err, DiditError::Api { .. }));
        assert_eq!(err.status(), None);
        assert_eq!(err.context(), Some("session retrieval"));
        let source = std::error::Error::source(&err)
            .and_then(|e| e.downcast_ref::<reqwest::Error>())
            .expect("reqwest error source");
        assert!(source.is_timeout());
    }

    #[tokio::test]
    async fn non_object_json_is_a_decode_error() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let _api = server
            .mock("GET", "/list")
            .with_status(200)
            .with_body("[1,2,3]")
            .create_async()
            .await;

        let client = client_for(&server);
        let url = format!("{}/list", server.url());
        let err = client
            .request_json(Method::GET, &url, None, None, DEFAULT_CONTEXT)
            .await
            .unwrap_err();

        assert!(matches!(err, DiditError::Decode { .. }));
    }
}
