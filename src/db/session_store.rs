// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device session persistence.
//!
//! The session is read once at startup and then served from memory; every
//! change is written through to the [`SecureStore`]. If the store is wiped
//! after startup the in-memory session is dropped as well.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::db::keys;
use crate::db::secure_store::{SecureStore, StoreError};
use crate::models::DeviceSession;

/// Holds the logged-in [`DeviceSession`], if any.
#[derive(Debug)]
pub struct SessionStore {
    store: Arc<SecureStore>,
    current: RwLock<Option<Arc<DeviceSession>>>,
    /// Store generation `current` was read or written under
    generation: AtomicU64,
}

impl SessionStore {
    /// Load the persisted session. A blob that fails to parse is deleted.
    pub fn load(store: Arc<SecureStore>) -> Result<Self, StoreError> {
        let current = match store.get(keys::DEVICE_SESSION)? {
            Some(raw) => match serde_json::from_str::<DeviceSession>(&raw) {
                Ok(session) => {
                    tracing::info!(
                        user_id = %session.user_id,
                        family_id = %session.family_id,
                        "Session restored"
                    );
                    Some(Arc::new(session))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable session");
                    store.remove(keys::DEVICE_SESSION)?;
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            generation: AtomicU64::new(store.generation()),
            store,
            current: RwLock::new(current),
        })
    }

    /// Currently logged-in session.
    pub fn current(&self) -> Option<Arc<DeviceSession>> {
        let generation = self.store.generation();
        if generation != self.generation.load(Ordering::Acquire) {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            if let Some(dropped) = current.take() {
                tracing::warn!(user_id = %dropped.user_id, "Secure storage was reset, session dropped");
            }
            self.generation.store(generation, Ordering::Release);
            return None;
        }

        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current().is_some()
    }

    /// Persist `session`, replacing any previous one.
    pub fn save(&self, session: DeviceSession) -> Result<Arc<DeviceSession>, StoreError> {
        let raw = serde_json::to_string(&session)?;
        self.store.put(keys::DEVICE_SESSION, &raw)?;

        let session = Arc::new(session);
        self.set(Some(session.clone()));
        Ok(session)
    }

    /// Delete the session blob.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(keys::DEVICE_SESSION)?;
        self.set(None);
        Ok(())
    }

    fn set(&self, session: Option<Arc<DeviceSession>>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = session;
        self.generation.store(self.store.generation(), Ordering::Release);
    }

    /// Advance the last-synced timestamp. No-op without a session.
    pub fn record_sync(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let Some(current) = self.current() else {
            return Ok(());
        };
        let mut updated = (*current).clone();
        updated.last_synced_at = Some(at);
        self.save(updated)?;
        Ok(())
    }

    /// Stable per-install identifier, created on first use.
    ///
    /// Survives logout so the backend sees the same device across logins.
    pub fn device_id(&self) -> Result<String, StoreError> {
        if let Some(id) = self.store.get(keys::DEVICE_ID)? {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.store.put(keys::DEVICE_ID, &id)?;
        tracing::info!(device_id = %id, "Generated device id");
        Ok(id)
    }
}
