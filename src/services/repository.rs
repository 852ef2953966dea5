// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-collection repositories: cached reads, write-through mutations.
//!
//! Reads never touch the network. Writes go to the backend first and only
//! the backend's response is cached; the locally built object is never
//! assumed to match what the server stored.

use serde_json::{json, Value};
use std::marker::PhantomData;
use tokio::sync::watch;

use crate::db::LocalCache;
use crate::error::{ClientError, Result};
use crate::models::{Chore, Entity, RewardRedemption, Reward};
use crate::services::api::ApiClient;
use crate::services::photo::prepare_photo;

/// Repository for one entity type.
pub struct Repository<E: Entity> {
    api: ApiClient,
    cache: LocalCache,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cache: self.cache.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(api: ApiClient, cache: LocalCache) -> Self {
        Self {
            api,
            cache,
            _entity: PhantomData,
        }
    }

    /// Cached records, immediately.
    pub async fn list(&self) -> Result<Vec<E>> {
        self.cache.list().await
    }

    pub async fn get(&self, id: &str) -> Result<Option<E>> {
        self.cache.get(id).await
    }

    /// Watch the cached collection.
    pub fn observe(&self) -> CollectionWatcher<E> {
        CollectionWatcher {
            rx: self.cache.subscribe(E::COLLECTION),
            cache: self.cache.clone(),
            _entity: PhantomData,
        }
    }

    /// Replace the cached collection with the backend's.
    pub async fn refresh(&self) -> Result<usize> {
        let records = self.api.list_raw(E::COLLECTION).await?;
        let count = self.cache.replace_collection(E::COLLECTION, &records).await?;
        tracing::debug!(collection = %E::COLLECTION, count, "Collection refreshed");
        Ok(count)
    }

    pub async fn create(&self, entity: &E) -> Result<E> {
        let saved = self.api.create(entity).await?;
        self.cache.upsert(&saved).await?;
        Ok(saved)
    }

    pub async fn update(&self, entity: &E) -> Result<E> {
        let saved = self.api.update(entity).await?;
        self.cache.upsert(&saved).await?;
        Ok(saved)
    }

    /// Delete on the backend, then locally.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.api.delete(E::COLLECTION, id).await?;
        self.cache.delete(E::COLLECTION, &[id.to_string()]).await?;
        Ok(())
    }

    /// Run a domain action on this collection and cache the returned record.
    ///
    /// The result may belong to another collection (redeeming a reward
    /// returns a redemption).
    pub async fn perform<T: Entity>(&self, action: &str, payload: Value) -> Result<T> {
        let saved: T = self.api.perform(E::COLLECTION, action, payload).await?;
        self.cache.upsert(&saved).await?;
        Ok(saved)
    }
}

impl Repository<Chore> {
    /// Mark a chore done, optionally with a proof photo already uploaded.
    pub async fn complete(&self, chore_id: &str, photo_url: Option<&str>) -> Result<Chore> {
        self.perform(
            "complete",
            json!({ "id": chore_id, "photoUrl": photo_url }),
        )
        .await
    }

    /// Shrink and upload a proof photo, then mark the chore done.
    pub async fn complete_with_photo(&self, chore_id: &str, image: &[u8]) -> Result<Chore> {
        let photo = prepare_photo(image).map_err(|e| ClientError::BadRequest(e.to_string()))?;
        let uploaded = self.api.upload_photo(chore_id, &photo).await?;
        tracing::info!(chore_id, url = %uploaded.url, "Proof photo uploaded");
        self.complete(chore_id, Some(&uploaded.url)).await
    }

    /// Parent approves (awarding points) or rejects a completed chore.
    pub async fn verify(&self, chore_id: &str, approved: bool) -> Result<Chore> {
        self.perform("verify", json!({ "id": chore_id, "approved": approved }))
            .await
    }
}

impl Repository<Reward> {
    /// Request a reward for the logged-in member.
    pub async fn redeem(&self, reward_id: &str) -> Result<RewardRedemption> {
        self.perform("redeem", json!({ "rewardId": reward_id })).await
    }
}

impl Repository<RewardRedemption> {
    /// Parent approves or denies a pending redemption.
    pub async fn resolve(&self, redemption_id: &str, approve: bool) -> Result<RewardRedemption> {
        let action = if approve { "approve" } else { "deny" };
        self.perform(action, json!({ "id": redemption_id })).await
    }
}

/// Continuously observed view of a cached collection.
pub struct CollectionWatcher<E: Entity> {
    rx: watch::Receiver<u64>,
    cache: LocalCache,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> CollectionWatcher<E> {
    /// Current cached contents.
    pub async fn current(&mut self) -> Result<Vec<E>> {
        drop(self.rx.borrow_and_update());
        self.cache.list().await
    }

    /// Wait for the next write to the collection and return the new contents.
    pub async fn changed(&mut self) -> Result<Vec<E>> {
        self.rx
            .changed()
            .await
            .map_err(|_| ClientError::Internal(anyhow::anyhow!("Local cache closed")))?;
        self.cache.list().await
    }
}
