// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP transport for the Apps Script backend.
//!
//! Handles:
//! - `?path=<area>&action=<verb>` URL construction
//! - Rewriting the malformed `.../exec/?` URL form before dispatch
//! - The `{ success, error, errorCode, ... }` response envelope

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Raw backend transport. Knows nothing about sessions or tokens.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
}

impl Transport {
    /// Create a transport for `base_url` with the given connect/read timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the URL for `path`/`action` plus extra query parameters.
    pub fn endpoint_url(&self, path: &str, action: &str, query: &[(&str, String)]) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{}path={}&action={}",
            self.base_url,
            separator,
            urlencoding::encode(path),
            urlencoding::encode(action)
        );
        for (key, value) in query {
            url.push('&');
            url.push_str(&urlencoding::encode(key));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    /// GET request; the response body (minus the envelope) decodes into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        action: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = normalize_url(&self.endpoint_url(path, action, query));
        tracing::debug!(path, action, "GET backend");

        let response = self.http.get(&url).send().await?;
        check_response(response).await
    }

    /// POST request with a JSON body.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        action: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T> {
        let url = normalize_url(&self.endpoint_url(path, action, query));
        tracing::debug!(path, action, "POST backend");

        let response = self.http.post(&url).json(body).send().await?;
        check_response(response).await
    }
}

/// Check status and envelope, then decode the body.
async fn check_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;

    if status.as_u16() == 401 {
        return Err(ClientError::Unauthorized);
    }

    let parsed: Option<Value> = serde_json::from_str(&text).ok();

    if !status.is_success() {
        // Apps Script sometimes reports logical failures with an error status.
        if let Some(value) = parsed.as_ref().filter(|v| v.get("success").is_some()) {
            if let Some(err) = envelope_error(value) {
                return Err(err);
            }
        }
        return Err(ClientError::Http {
            status: status.as_u16(),
            body: truncate(&text, 200),
        });
    }

    let value = parsed.ok_or_else(|| {
        // Usually an HTML error page from Google rather than JSON.
        ClientError::Decode(format!("Response is not JSON: {}", truncate(&text, 120)))
    })?;

    if let Some(err) = envelope_error(&value) {
        return Err(err);
    }

    serde_json::from_value(value).map_err(ClientError::from)
}

/// Map a `success:false` (or missing `success`) envelope to an error.
fn envelope_error(value: &Value) -> Option<ClientError> {
    if value.get("success").and_then(Value::as_bool) == Some(true) {
        return None;
    }

    let code = value.get("errorCode").and_then(Value::as_str);
    let message = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Backend reported failure without a message")
        .to_string();

    Some(match code {
        Some(ClientError::TOKEN_VERSION_MISMATCH) => ClientError::SessionRevoked,
        Some(ClientError::UNAUTHORIZED) => ClientError::Unauthorized,
        _ => ClientError::Backend(message),
    })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Rewrite malformed backend URLs before dispatch.
///
/// Apps Script rejects `.../exec/?path=...`; the slash before the query
/// string is dropped and duplicate slashes in the path are collapsed.
pub fn normalize_url(url: &str) -> String {
    let (before_query, query) = match url.split_once('?') {
        Some((before, query)) => (before, Some(query)),
        None => (url, None),
    };
    let (scheme, rest) = match before_query.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, before_query),
    };

    let mut path = String::with_capacity(rest.len());
    let mut prev_slash = false;
    for ch in rest.chars() {
        if ch == '/' && prev_slash {
            continue;
        }
        prev_slash = ch == '/';
        path.push(ch);
    }

    if query.is_some() && path.ends_with('/') {
        path.pop();
    }

    let mut normalized = String::with_capacity(url.len());
    if let Some(scheme) = scheme {
        normalized.push_str(scheme);
        normalized.push_str("://");
    }
    normalized.push_str(&path);
    if let Some(query) = query {
        normalized.push('?');
        normalized.push_str(query);
    }

    if normalized != url {
        tracing::debug!(original = %url, rewritten = %normalized, "Rewrote backend URL");
    }
    normalized
}
