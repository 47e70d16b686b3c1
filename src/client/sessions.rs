// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification session operations.
//!
//! Sessions are never cached locally; every read and update round-trips to
//! the API.

use reqwest::{
    header::{HeaderValue, ACCEPT},
    Method,
};
use serde_json::Value;
use tracing::{debug, warn};

use super::VerificationClient;
use crate::{
    error::{DiditError, Result},
    models::{JsonObject, SessionStatus},
};

const SESSION_CREATION: &str = "session creation";
const SESSION_RETRIEVAL: &str = "session retrieval";
const STATUS_UPDATE: &str = "status update";
const PDF_GENERATION: &str = "PDF generation";

const APPLICATION_PDF: &str = "application/pdf";

impl VerificationClient {
    /// Create a verification session.
    ///
    /// `callback` is set from `callback_url` first and `options` are then
    /// applied on top, so an explicit `callback` option replaces it.
    /// `vendor_data` is sent as-is unless it is null or empty.
    pub async fn create_session(
        &self,
        callback_url: &str,
        vendor_data: Option<Value>,
        options: JsonObject,
    ) -> Result<JsonObject> {
        require(callback_url, "callback_url is required")?;

        let mut body = JsonObject::new();
        body.insert("callback".to_string(), Value::String(callback_url.to_string()));
        body.extend(options);
        if let Some(vendor_data) = vendor_data.filter(|v| !is_blank(v)) {
            body.insert("vendor_data".to_string(), vendor_data);
        }

        let url = format!("{}/v1/session/", self.config.api_root());
        self.request_json(
            Method::POST,
            &url,
            Some(&Value::Object(body)),
            None,
            SESSION_CREATION,
        )
        .await
    }

    /// Fetch the decision for a session.
    pub async fn get_session(&self, session_id: &str) -> Result<JsonObject> {
        require(session_id, "sessionId is required")?;

        let url = format!("{}/v1/session/{session_id}/decision/", self.config.api_root());
        self.request_json(Method::GET, &url, None, None, SESSION_RETRIEVAL)
            .await
    }

    /// Approve or decline a session.
    ///
    /// `new_status` must be exactly `Approved` or `Declined`; anything else
    /// is rejected before a token is requested.
    pub async fn update_session_status(
        &self,
        session_id: &str,
        new_status: &str,
        comment: Option<&str>,
    ) -> Result<JsonObject> {
        require(session_id, "sessionId is required")?;
        let status: SessionStatus = new_status.parse()?;

        let mut body = JsonObject::new();
        body.insert(
            "new_status".to_string(),
            Value::String(status.as_str().to_string()),
        );
        if let Some(comment) = comment.filter(|c| !c.is_empty()) {
            body.insert("comment".to_string(), Value::String(comment.to_string()));
        }

        let url = format!(
            "{}/v1/session/{session_id}/update-status/",
            self.config.api_root()
        );
        self.request_json(
            Method::PATCH,
            &url,
            Some(&Value::Object(body)),
            None,
            STATUS_UPDATE,
        )
        .await
    }

    /// Download the PDF report for a session.
    ///
    /// A token failure surfaces as an authentication error rather than a
    /// `PDF generation` error; the download itself only asks for
    /// `application/pdf`.
    pub async fn generate_session_pdf(&self, session_id: &str) -> Result<Vec<u8>> {
        require(session_id, "sessionId is required")?;

        let url = format!(
            "{}/v1/session/{session_id}/generate-pdf/",
            self.config.api_root()
        );
        let token = self.get_access_token().await?;

        if self.config.debug {
            debug!(target: "didit", url = %url, "Requesting session PDF");
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(ACCEPT, HeaderValue::from_static(APPLICATION_PDF))
            .send()
            .await
            .map_err(|e| DiditError::api_transport(PDF_GENERATION, e))?;

        let response = self.ensure_success(response, PDF_GENERATION).await?;
        let bytes = response.bytes().await.map_err(|e| {
            warn!(error = %e, "Failed to read PDF body");
            DiditError::api_transport(PDF_GENERATION, e)
        })?;

        Ok(bytes.to_vec())
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn require(value: &str, message: &str) -> Result<()> {
    if value.is_empty() {
        return Err(DiditError::Validation(message.to_string()));
    }
    Ok(())
}
