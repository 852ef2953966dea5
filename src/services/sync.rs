// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic pull of backend deltas into the local cache.
//!
//! The loop polls `sync/changes` on a fixed interval (short in the
//! foreground, long in the background), or immediately when triggered.
//! Incoming records replace local ones unconditionally. A failed tick
//! changes nothing and is retried on the next one.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::db::{LocalCache, SessionStore};
use crate::error::{ClientError, Result};
use crate::services::api::ApiClient;
use crate::time_utils::Clock;

/// What one sync pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub upserted: usize,
    pub deleted: usize,
    pub wiped: bool,
    /// New last-synced timestamp
    pub synced_at: DateTime<Utc>,
}

struct SyncInner {
    api: ApiClient,
    cache: LocalCache,
    sessions: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
    foreground_interval: Duration,
    background_interval: Duration,
    foreground: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    trigger: Notify,
    /// One pass at a time, whether from the loop or `sync_now`. Login and
    /// logout hold it too, so a pass never straddles a session change.
    pass_lock: Arc<Mutex<()>>,
}

/// Background sync driver.
pub struct SyncManager {
    inner: Arc<SyncInner>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    pub fn new(
        api: ApiClient,
        cache: LocalCache,
        sessions: Arc<SessionStore>,
        clock: Arc<dyn Clock>,
        foreground_interval: Duration,
        background_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                api,
                cache,
                sessions,
                clock,
                foreground_interval,
                background_interval,
                foreground: watch::channel(true).0,
                shutdown: watch::channel(false).0,
                trigger: Notify::new(),
                pass_lock: Arc::new(Mutex::new(())),
            }),
            task: std::sync::Mutex::new(None),
        }
    }

    /// Start the polling loop. The first pass runs immediately.
    /// Calling `start` on a running manager does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        self.inner.shutdown.send_replace(false);

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move { inner.run_loop().await }));
        tracing::info!("Sync loop started");
    }

    /// Switch between foreground and background polling.
    /// Coming to the foreground also syncs right away.
    pub fn set_foreground(&self, foreground: bool) {
        let changed = self.inner.foreground.send_replace(foreground) != foreground;
        if changed && foreground {
            self.trigger();
        }
        tracing::debug!(foreground, "Sync mode changed");
    }

    pub fn is_foreground(&self) -> bool {
        *self.inner.foreground.borrow()
    }

    /// Ask the loop for an immediate pass.
    pub fn trigger(&self) {
        self.inner.trigger.notify_one();
    }

    /// Lock held for the duration of each sync pass.
    pub fn pass_lock(&self) -> Arc<Mutex<()>> {
        self.inner.pass_lock.clone()
    }

    /// Run one pass inline.
    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        self.inner.run_once().await
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Sync loop ended abnormally");
            }
        }
        tracing::info!("Sync loop stopped");
    }
}

impl SyncInner {
    async fn run_loop(&self) {
        let mut foreground_rx = self.foreground.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(outcome) => tracing::debug!(
                    upserted = outcome.upserted,
                    deleted = outcome.deleted,
                    "Sync pass complete"
                ),
                Err(ClientError::NotLoggedIn) => tracing::debug!("Sync skipped, not logged in"),
                Err(e) if e.is_network_error() => {
                    tracing::info!(error = %e, "Backend unreachable, will retry next tick")
                }
                Err(e) => tracing::warn!(error = %e, "Sync pass failed, retrying next tick"),
            }

            // Wait for the next tick; a mode switch restarts the wait with
            // the new interval.
            loop {
                let interval = if *foreground_rx.borrow_and_update() {
                    self.foreground_interval
                } else {
                    self.background_interval
                };

                tokio::select! {
                    _ = tokio::time::sleep(interval) => break,
                    _ = self.trigger.notified() => break,
                    changed = foreground_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = shutdown_rx.changed() => return,
                }
            }
        }
    }

    async fn run_once(&self) -> Result<SyncOutcome> {
        let _guard = self.pass_lock.lock().await;

        let session = self.sessions.current().ok_or(ClientError::NotLoggedIn)?;
        let requested_at = self.clock.now();

        let changes = self.api.changes_since(session.last_synced_at).await?;

        // The session can still be revoked by a concurrent API call.
        if !self
            .sessions
            .current()
            .is_some_and(|current| Arc::ptr_eq(&current, &session))
        {
            tracing::info!(user_id = %session.user_id, "Session ended during sync, discarding changes");
            return Err(ClientError::NotLoggedIn);
        }

        let applied = self.cache.apply_changes(&changes).await?;

        // Prefer the backend clock so device clock skew can't skip changes.
        let synced_at = changes.server_time.unwrap_or(requested_at);
        self.sessions.record_sync(synced_at)?;

        if applied.wiped {
            tracing::warn!(user_id = %session.user_id, "Backend requested a local data wipe");
        }
        tracing::info!(
            upserted = applied.upserted,
            deleted = applied.deleted,
            synced_at = %synced_at,
            "Synced with backend"
        );

        Ok(SyncOutcome {
            upserted: applied.upserted,
            deleted: applied.deleted,
            wiped: applied.wiped,
            synced_at,
        })
    }
}
