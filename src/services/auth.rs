// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login and logout.
//!
//! Two ways in: the primary parent signs in with Google (the app hands us
//! the resulting ID token), everyone else scans a QR code shown on a
//! parent's device. Both end with a persisted [`DeviceSession`] and,
//! when the backend returns them, seeded Drive tokens.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::db::{LocalCache, SessionStore};
use crate::error::{ClientError, Result};
use crate::models::DeviceSession;
use crate::services::api::{ApiClient, LoginResponse};
use crate::services::qr::{parse_login_code, QrPayload};
use crate::services::token::TokenManager;
use crate::time_utils::Clock;

/// Session lifecycle service.
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
    sessions: Arc<SessionStore>,
    tokens: Arc<TokenManager>,
    cache: LocalCache,
    clock: Arc<dyn Clock>,
    qr_max_age: Duration,
    /// The sync pass lock; see [`crate::services::SyncManager::pass_lock`].
    sync_lock: Arc<Mutex<()>>,
}

impl AuthService {
    pub fn new(
        api: ApiClient,
        sessions: Arc<SessionStore>,
        tokens: Arc<TokenManager>,
        cache: LocalCache,
        clock: Arc<dyn Clock>,
        qr_max_age: Duration,
        sync_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            api,
            sessions,
            tokens,
            cache,
            clock,
            qr_max_age,
            sync_lock,
        }
    }

    /// Log in from a scanned QR code.
    pub async fn login_with_qr(&self, scanned: &str) -> Result<Arc<DeviceSession>> {
        let payload = parse_login_code(scanned).map_err(|e| ClientError::BadRequest(e.to_string()))?;
        payload
            .check_age(self.clock.now(), self.qr_max_age)
            .map_err(|e| ClientError::BadRequest(e.to_string()))?;

        let device_id = self.sessions.device_id()?;
        let response = self.api.qr_login(&payload, &device_id).await?;

        tracing::info!(
            user_id = %response.user_id,
            family_id = %response.family_id,
            "QR login confirmed"
        );
        self.establish(response, device_id, Some(&payload)).await
    }

    /// Log in the primary parent with a Google ID token.
    pub async fn login_with_google(&self, id_token: &str) -> Result<Arc<DeviceSession>> {
        if id_token.trim().is_empty() {
            return Err(ClientError::BadRequest("Empty Google ID token".to_string()));
        }

        let device_id = self.sessions.device_id()?;
        let response = self.api.google_login(id_token, &device_id).await?;

        tracing::info!(
            user_id = %response.user_id,
            owner_email = %response.owner_email,
            "Google login confirmed"
        );
        self.establish(response, device_id, None).await
    }

    /// Forget the session, its tokens and all cached family data.
    ///
    /// The backend is told first, but a failure there does not stop the
    /// local logout. A sync pass in flight finishes before anything is
    /// cleared.
    pub async fn logout(&self) -> Result<()> {
        let Some(session) = self.sessions.current() else {
            self.tokens.clear();
            return Ok(());
        };

        if let Err(e) = self.api.logout(&session).await {
            tracing::warn!(error = %e, "Backend logout failed, clearing local state anyway");
        }

        let _pass = self.sync_lock.lock().await;
        self.tokens.clear();
        self.sessions.clear()?;
        self.cache.clear_all().await?;

        tracing::info!(user_id = %session.user_id, "Logged out");
        Ok(())
    }

    async fn establish(
        &self,
        response: LoginResponse,
        device_id: String,
        qr: Option<&QrPayload>,
    ) -> Result<Arc<DeviceSession>> {
        let _pass = self.sync_lock.lock().await;

        // Another family's data must not survive a re-login.
        if let Some(previous) = self.sessions.current() {
            if previous.family_id != response.family_id {
                tracing::info!(
                    previous = %previous.family_id,
                    next = %response.family_id,
                    "Family changed, clearing local cache"
                );
                self.cache.clear_all().await?;
            }
        }

        // Tokens belong to whoever was logged in before.
        self.tokens.clear();

        let mut user_name = response.user_name;
        if user_name.is_empty() {
            user_name = qr.and_then(|p| p.user_name.clone()).unwrap_or_default();
        }

        let session = self.sessions.save(DeviceSession {
            family_id: response.family_id,
            user_id: response.user_id,
            user_name,
            role: response.role,
            auth_token: response.token,
            token_version: response.token_version,
            owner_email: response.owner_email,
            device_id,
            logged_in_at: self.clock.now(),
            last_synced_at: None,
        })?;

        if let Some(access_token) = response.access_token.as_deref() {
            self.tokens.store_tokens(
                access_token,
                response.refresh_token.as_deref(),
                response.expires_in,
            );
        }

        Ok(session)
    }
}
