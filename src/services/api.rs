// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authenticated backend API.
//!
//! Every call carries the session's identity (`familyId`, `userId`, `token`,
//! `ownerEmail`, `deviceId`) and, when the token manager can provide one, a
//! Drive `accessToken`. Without an access token the backend falls back to
//! resolving Drive access itself, so a missing token is not an error.
//!
//! A 401 triggers one forced token refresh and one retry. A token version
//! mismatch invalidates the local session.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::SessionStore;
use crate::error::{ClientError, Result};
use crate::models::{ChangeSet, Collection, DeviceSession, Entity, UserRole};
use crate::services::photo::PreparedPhoto;
use crate::services::qr::QrPayload;
use crate::services::token::TokenManager;
use crate::services::transport::Transport;
use crate::time_utils::{format_utc_rfc3339, Clock};

#[derive(Debug, Deserialize)]
struct ItemsResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse<T> {
    item: T,
}

/// Backend reply to a login call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub family_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub role: UserRole,
    /// Backend auth token for this member
    pub token: String,
    #[serde(default)]
    pub token_version: u32,
    pub owner_email: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// One operation inside a batch call.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOperation {
    pub path: String,
    pub action: String,
    pub payload: Value,
}

impl BatchOperation {
    pub fn new(collection: Collection, action: &str, payload: Value) -> Self {
        Self {
            path: collection.as_str().to_string(),
            action: action.to_string(),
            payload,
        }
    }
}

/// Per-operation batch result.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub item: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Vec<BatchResult>,
}

/// Result of a photo upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPhoto {
    pub url: String,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
}

/// Authenticated API client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    transport: Transport,
    sessions: Arc<SessionStore>,
    tokens: Arc<TokenManager>,
    clock: Arc<dyn Clock>,
}

impl ApiClient {
    pub fn new(
        transport: Transport,
        sessions: Arc<SessionStore>,
        tokens: Arc<TokenManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            sessions,
            tokens,
            clock,
        }
    }

    // ─── Auth (no session required) ──────────────────────────────

    /// Exchange a Google ID token for a session.
    pub async fn google_login(&self, id_token: &str, device_id: &str) -> Result<LoginResponse> {
        self.transport
            .post(
                "auth",
                "googleLogin",
                &[],
                &json!({ "idToken": id_token, "deviceId": device_id }),
            )
            .await
    }

    /// Confirm a scanned QR login code with the backend.
    pub async fn qr_login(&self, payload: &QrPayload, device_id: &str) -> Result<LoginResponse> {
        self.transport
            .post(
                "auth",
                "qrLogin",
                &[],
                &json!({
                    "familyId": payload.family_id,
                    "userId": payload.user_id,
                    "token": payload.token,
                    "version": payload.version,
                    "ownerEmail": payload.owner_email,
                    "deviceId": device_id,
                }),
            )
            .await
    }

    /// Tell the backend this device is logging out.
    pub async fn logout(&self, session: &DeviceSession) -> Result<()> {
        let _: Value = self
            .transport
            .post(
                "auth",
                "logout",
                &auth_query(session, None),
                &json!({ "deviceId": session.device_id }),
            )
            .await?;
        Ok(())
    }

    // ─── Collections ─────────────────────────────────────────────

    /// Whole collection as raw JSON records.
    pub async fn list_raw(&self, collection: Collection) -> Result<Vec<Value>> {
        let response: ItemsResponse<Value> = self
            .call(Method::Get, collection.as_str(), "list", Vec::new(), None)
            .await?;
        Ok(response.items)
    }

    pub async fn list<E: Entity>(&self) -> Result<Vec<E>> {
        let response: ItemsResponse<E> = self
            .call(Method::Get, E::COLLECTION.as_str(), "list", Vec::new(), None)
            .await?;
        Ok(response.items)
    }

    /// Create a record; returns the backend's stored copy.
    pub async fn create<E: Entity>(&self, entity: &E) -> Result<E> {
        self.write(E::COLLECTION, "create", json!({ "item": entity })).await
    }

    /// Update a record; returns the backend's stored copy.
    pub async fn update<E: Entity>(&self, entity: &E) -> Result<E> {
        self.write(E::COLLECTION, "update", json!({ "item": entity })).await
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let _: Value = self
            .call(
                Method::Post,
                collection.as_str(),
                "delete",
                Vec::new(),
                Some(json!({ "id": id })),
            )
            .await?;
        Ok(())
    }

    /// Domain verb on a collection (`complete`, `verify`, `redeem`, ...).
    pub async fn perform<T: DeserializeOwned>(
        &self,
        collection: Collection,
        action: &str,
        payload: Value,
    ) -> Result<T> {
        self.write(collection, action, payload).await
    }

    async fn write<T: DeserializeOwned>(&self, collection: Collection, action: &str, body: Value) -> Result<T> {
        let response: ItemResponse<T> = self
            .call(Method::Post, collection.as_str(), action, Vec::new(), Some(body))
            .await?;
        Ok(response.item)
    }

    // ─── Batch, sync, photos ─────────────────────────────────────

    /// Run several operations in one round trip.
    pub async fn batch(&self, operations: &[BatchOperation]) -> Result<Vec<BatchResult>> {
        let response: BatchResponse = self
            .call(
                Method::Post,
                "batch",
                "execute",
                Vec::new(),
                Some(json!({ "operations": operations })),
            )
            .await?;

        if response.results.len() != operations.len() {
            return Err(ClientError::Decode(format!(
                "Batch returned {} results for {} operations",
                response.results.len(),
                operations.len()
            )));
        }
        Ok(response.results)
    }

    /// Changes since `since`; `None` asks for everything.
    pub async fn changes_since(&self, since: Option<DateTime<Utc>>) -> Result<ChangeSet> {
        let query = since
            .map(|at| vec![("since", format_utc_rfc3339(at))])
            .unwrap_or_default();
        self.call(Method::Get, "sync", "changes", query, None).await
    }

    /// Upload a prepared chore photo as base64 JSON.
    pub async fn upload_photo(&self, chore_id: &str, photo: &PreparedPhoto) -> Result<UploadedPhoto> {
        let body = json!({
            "choreId": chore_id,
            "fileName": format!("{}-{}.jpg", chore_id, self.clock.now().timestamp_millis()),
            "mimeType": photo.mime_type,
            "data": photo.to_base64(),
        });
        self.call(Method::Post, "photos", "upload", Vec::new(), Some(body))
            .await
    }

    // ─── Request plumbing ────────────────────────────────────────

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        action: &str,
        query: Vec<(&'static str, String)>,
        body: Option<Value>,
    ) -> Result<T> {
        let session = self.sessions.current().ok_or(ClientError::NotLoggedIn)?;
        let access_token = self.tokens.get_valid_access_token().await;

        let first = self
            .send(method, path, action, &query, body.as_ref(), &session, access_token.as_deref())
            .await;

        let result = match first {
            Err(e) if e.is_auth_error() => {
                tracing::info!(path, action, "Backend rejected credentials, retrying after token refresh");
                let access_token = self.tokens.force_refresh_token().await;
                self.send(method, path, action, &query, body.as_ref(), &session, access_token.as_deref())
                    .await
            }
            other => other,
        };

        if let Err(ClientError::SessionRevoked) = &result {
            self.invalidate_session(&session);
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        action: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
        session: &DeviceSession,
        access_token: Option<&str>,
    ) -> Result<T> {
        let mut params = auth_query(session, access_token);
        params.extend(query.iter().cloned());

        match method {
            Method::Get => self.transport.get(path, action, &params).await,
            Method::Post => {
                let empty = json!({});
                self.transport
                    .post(path, action, &params, body.unwrap_or(&empty))
                    .await
            }
        }
    }

    /// Token version changed on the backend: this device's login is void.
    fn invalidate_session(&self, session: &DeviceSession) {
        tracing::warn!(
            user_id = %session.user_id,
            token_version = session.token_version,
            "Token version mismatch, invalidating session"
        );
        self.tokens.clear();
        if let Err(e) = self.sessions.clear() {
            tracing::error!(error = %e, "Failed to clear revoked session");
        }
    }
}

fn auth_query(session: &DeviceSession, access_token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("familyId", session.family_id.clone()),
        ("userId", session.user_id.clone()),
        ("token", session.auth_token.clone()),
        ("ownerEmail", session.owner_email.clone()),
        ("deviceId", session.device_id.clone()),
    ];
    if let Some(token) = access_token {
        params.push(("accessToken", token.to_string()));
    }
    params
}
