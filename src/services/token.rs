// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Drive access token lifecycle.
//!
//! The backend mints short-lived access tokens for the logged-in member.
//! This manager keeps the current one in the secure store and asks the
//! backend for a new one when it is missing or expired.
//!
//! Nothing here returns an error: a `None` token means "call the backend
//! without one", which the API client supports. Failures are logged.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::keys;
use crate::db::{SecureStore, SessionStore};
use crate::models::DeviceSession;
use crate::services::transport::Transport;
use crate::time_utils::{from_epoch_millis, Clock};

/// Token lifetime assumed when the backend omits `expiresIn`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    user_id: &'a str,
    token: &'a str,
    owner_email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// Token refresh response from the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Present when the backend rotates the refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Hands out valid access tokens, refreshing through the backend.
pub struct TokenManager {
    transport: Transport,
    store: Arc<SecureStore>,
    sessions: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
    /// Serializes refreshes so concurrent callers share one request.
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        transport: Transport,
        store: Arc<SecureStore>,
        sessions: Arc<SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            store,
            sessions,
            clock,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Get a valid (non-expired) access token.
    ///
    /// 1. No session: `None`, no network.
    /// 2. Stored token with `now < expiry`: returned, no network.
    /// 3. Otherwise take the refresh lock, re-check (another task may have
    ///    refreshed while we waited), then refresh with the backend.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        let session = self.sessions.current()?;

        if let Some(token) = self.stored_valid_token() {
            return Some(token);
        }

        let _guard = self.refresh_lock.lock().await;

        if let Some(token) = self.stored_valid_token() {
            return Some(token);
        }

        tracing::info!(user_id = %session.user_id, "Access token missing or expired, refreshing");
        self.refresh(&session).await
    }

    /// Drop the stored access token and request a new one unconditionally.
    ///
    /// Used after a downstream call came back 401.
    pub async fn force_refresh_token(&self) -> Option<String> {
        let session = self.sessions.current()?;
        let _guard = self.refresh_lock.lock().await;

        if let Err(e) = self
            .store
            .remove_all(&[keys::ACCESS_TOKEN, keys::TOKEN_EXPIRY])
        {
            tracing::warn!(error = %e, "Failed to clear stored access token");
        }

        tracing::info!(user_id = %session.user_id, "Forcing access token refresh");
        self.refresh(&session).await
    }

    /// Seed tokens returned by a login call.
    pub fn store_tokens(&self, access_token: &str, refresh_token: Option<&str>, expires_in: Option<i64>) {
        let expiry = expiry_after(self.clock.now(), expires_in);
        self.persist(access_token, refresh_token, expiry);
    }

    /// Remove the access token, refresh token and expiry.
    pub fn clear(&self) {
        if let Err(e) = self.store.remove_all(&keys::TOKEN_KEYS) {
            tracing::warn!(error = %e, "Failed to clear stored tokens");
        }
    }

    /// Expiry of the stored access token, if any.
    pub fn stored_expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.read(keys::TOKEN_EXPIRY)?;
        match raw.parse::<i64>() {
            Ok(millis) => from_epoch_millis(millis),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparseable token expiry");
                None
            }
        }
    }

    /// Stored token if `now < expiry`. A token without an expiry is never valid.
    fn stored_valid_token(&self) -> Option<String> {
        let token = self.read(keys::ACCESS_TOKEN)?;
        let expiry = self.stored_expiry()?;
        (self.clock.now() < expiry).then_some(token)
    }

    async fn refresh(&self, session: &DeviceSession) -> Option<String> {
        let requested_at = self.clock.now();
        let stored_refresh = self.read(keys::REFRESH_TOKEN);

        let request = RefreshRequest {
            user_id: &session.user_id,
            token: &session.auth_token,
            owner_email: &session.owner_email,
            refresh_token: stored_refresh.as_deref(),
        };

        let response: RefreshResponse = match self
            .transport
            .post("auth", "refreshToken", &[], &request)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, user_id = %session.user_id, "Token refresh failed");
                return None;
            }
        };

        let Some(access_token) = response.access_token.filter(|t| !t.is_empty()) else {
            tracing::warn!(user_id = %session.user_id, "Token refresh response had no access token");
            return None;
        };

        let expiry = expiry_after(requested_at, response.expires_in);
        self.persist(&access_token, response.refresh_token.as_deref(), expiry);

        tracing::info!(user_id = %session.user_id, expiry = %expiry, "Access token refreshed");
        Some(access_token)
    }

    fn persist(&self, access_token: &str, refresh_token: Option<&str>, expiry: DateTime<Utc>) {
        let expiry_millis = expiry.timestamp_millis().to_string();
        let mut values = vec![
            (keys::ACCESS_TOKEN, access_token),
            (keys::TOKEN_EXPIRY, expiry_millis.as_str()),
        ];
        if let Some(refresh) = refresh_token {
            values.push((keys::REFRESH_TOKEN, refresh));
        }

        if let Err(e) = self.store.put_all(&values) {
            tracing::warn!(error = %e, "Failed to persist access token");
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Secure storage read failed");
                None
            }
        }
    }
}

/// `now + expires_in` seconds. A lifetime chrono can't represent falls back
/// to [`DEFAULT_EXPIRES_IN_SECS`].
fn expiry_after(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let secs = expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let add = |secs| Duration::try_seconds(secs).and_then(|d| now.checked_add_signed(d));

    add(secs).unwrap_or_else(|| {
        tracing::warn!(expires_in = secs, "Token lifetime out of range, using default");
        add(DEFAULT_EXPIRES_IN_SECS).unwrap_or(now)
    })
}
