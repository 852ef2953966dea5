// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! ChoreQuest client core.
//!
//! This crate holds the device-side logic of the ChoreQuest family chore
//! tracker: login sessions, Drive access tokens, the Apps Script API,
//! cached repositories and the background sync loop.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

use futures_util::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;

use config::ClientConfig;
use db::{LocalCache, SecureStore, SessionStore};
use error::Result;
use models::{ActivityLog, Collection, DeviceSession, Family, Reward, RewardRedemption, Transaction, User};
use services::{ApiClient, AuthService, Repository, SyncManager, TokenManager, Transport};
use time_utils::{Clock, SystemClock};

/// Apps Script serializes requests per script; keep fan-out small.
const MAX_CONCURRENT_REFRESHES: usize = 3;

/// Everything a device needs, wired together.
pub struct ChoreQuest {
    pub config: ClientConfig,
    pub store: Arc<SecureStore>,
    pub sessions: Arc<SessionStore>,
    pub tokens: Arc<TokenManager>,
    pub api: ApiClient,
    pub auth: AuthService,
    pub cache: LocalCache,
    pub sync: SyncManager,
    pub users: Repository<User>,
    pub chores: Repository<models::Chore>,
    pub rewards: Repository<Reward>,
    pub redemptions: Repository<RewardRedemption>,
    pub transactions: Repository<Transaction>,
    pub activity_log: Repository<ActivityLog>,
    pub family: Repository<Family>,
}

impl ChoreQuest {
    /// Open with the on-disk cache in `config.data_dir` and the wall clock.
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let cache = LocalCache::open(&config.data_dir.join(db::CACHE_DB_FILE)).await?;
        Self::open_with(config, cache, Arc::new(SystemClock)).await
    }

    /// Open with an explicit cache and clock.
    ///
    /// Fails with [`db::StoreError::Unrecoverable`] (wrapped) if secure
    /// storage cannot be recovered; the caller must not continue.
    pub async fn open_with(config: ClientConfig, cache: LocalCache, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = Arc::new(SecureStore::open(&config.data_dir)?);
        let sessions = Arc::new(SessionStore::load(store.clone())?);

        let transport = Transport::new(&config.backend_url, config.http_timeout)?;
        let tokens = Arc::new(TokenManager::new(
            transport.clone(),
            store.clone(),
            sessions.clone(),
            clock.clone(),
        ));
        let api = ApiClient::new(transport, sessions.clone(), tokens.clone(), clock.clone());

        let sync = SyncManager::new(
            api.clone(),
            cache.clone(),
            sessions.clone(),
            clock.clone(),
            config.sync_foreground_interval,
            config.sync_background_interval,
        );
        let auth = AuthService::new(
            api.clone(),
            sessions.clone(),
            tokens.clone(),
            cache.clone(),
            clock,
            config.qr_max_age,
            sync.pass_lock(),
        );

        tracing::info!(
            backend = %config.backend_url,
            data_dir = %config.data_dir.display(),
            logged_in = sessions.is_logged_in(),
            "ChoreQuest client ready"
        );

        Ok(Self {
            users: Repository::new(api.clone(), cache.clone()),
            chores: Repository::new(api.clone(), cache.clone()),
            rewards: Repository::new(api.clone(), cache.clone()),
            redemptions: Repository::new(api.clone(), cache.clone()),
            transactions: Repository::new(api.clone(), cache.clone()),
            activity_log: Repository::new(api.clone(), cache.clone()),
            family: Repository::new(api.clone(), cache.clone()),
            config,
            store,
            sessions,
            tokens,
            api,
            auth,
            cache,
            sync,
        })
    }

    pub fn session(&self) -> Option<Arc<DeviceSession>> {
        self.sessions.current()
    }

    pub async fn login_with_qr(&self, scanned: &str) -> Result<Arc<DeviceSession>> {
        self.auth.login_with_qr(scanned).await
    }

    pub async fn login_with_google(&self, id_token: &str) -> Result<Arc<DeviceSession>> {
        self.auth.login_with_google(id_token).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.sync.shutdown().await;
        self.auth.logout().await
    }

    /// Get a valid access token (see [`TokenManager::get_valid_access_token`]).
    pub async fn get_valid_access_token(&self) -> Option<String> {
        self.tokens.get_valid_access_token().await
    }

    /// Re-download every collection, replacing the cache.
    pub async fn refresh_all(&self) -> Result<usize> {
        let counts: Vec<usize> = stream::iter(Collection::ALL)
            .map(|collection| async move {
                let records = self.api.list_raw(collection).await?;
                self.cache.replace_collection(collection, &records).await
            })
            .buffer_unordered(MAX_CONCURRENT_REFRESHES)
            .try_collect()
            .await?;

        let total: usize = counts.into_iter().sum();
        tracing::info!(total, "All collections refreshed");
        Ok(total)
    }
}
