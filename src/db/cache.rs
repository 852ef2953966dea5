// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite cache of backend records for offline reads.
//!
//! Records are stored as the backend's JSON body keyed by
//! `(collection, id)`. Reconciliation is whole-record replacement: the
//! server's copy always wins, there is no field-level merge.

use dashmap::DashMap;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{ClientError, Result};
use crate::models::{ChangeSet, Collection, Entity};

/// Local cache handle. Cheap to clone.
#[derive(Clone)]
pub struct LocalCache {
    pool: SqlitePool,
    /// Per-collection revision counters, bumped after every write.
    revisions: Arc<DashMap<Collection, watch::Sender<u64>>>,
}

/// Summary of an applied [`ChangeSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedChanges {
    pub upserted: usize,
    pub deleted: usize,
    pub wiped: bool,
}

impl LocalCache {
    /// Open (or create) the cache database at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::Internal(e.into()))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// In-memory cache (tests, ephemeral sessions).
    pub async fn in_memory() -> Result<Self> {
        // A single long-lived connection, or every connection gets its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            revisions: Arc::new(DashMap::new()),
        })
    }

    // ─── Reads ───────────────────────────────────────────────────

    /// Raw JSON bodies of a collection, ordered by id.
    pub async fn list_raw(&self, collection: Collection) -> Result<Vec<Value>> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM entities WHERE collection = ? ORDER BY id",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(ClientError::from))
            .collect()
    }

    /// Typed records of a collection. Rows that no longer decode are skipped.
    pub async fn list<E: Entity>(&self) -> Result<Vec<E>> {
        let raw = self.list_raw(E::COLLECTION).await?;
        Ok(raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<E>(value) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    tracing::warn!(
                        collection = %E::COLLECTION,
                        error = %e,
                        "Skipping cached record that does not decode"
                    );
                    None
                }
            })
            .collect())
    }

    /// One typed record. A row that no longer decodes reads as absent,
    /// the same as in [`LocalCache::list`].
    pub async fn get<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM entities WHERE collection = ? AND id = ?")
                .bind(E::COLLECTION.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(body) = body else {
            return Ok(None);
        };
        match serde_json::from_str::<E>(&body) {
            Ok(entity) => Ok(Some(entity)),
            Err(e) => {
                tracing::warn!(
                    collection = %E::COLLECTION,
                    id,
                    error = %e,
                    "Skipping cached record that does not decode"
                );
                Ok(None)
            }
        }
    }

    pub async fn count(&self, collection: Collection) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE collection = ?")
            .bind(collection.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ─── Writes ──────────────────────────────────────────────────

    /// Insert or replace one typed record.
    pub async fn upsert<E: Entity>(&self, entity: &E) -> Result<()> {
        let body = serde_json::to_string(entity)?;
        sqlx::query(UPSERT_SQL)
            .bind(E::COLLECTION.as_str())
            .bind(entity.id())
            .bind(body)
            .execute(&self.pool)
            .await?;

        self.notify(E::COLLECTION);
        Ok(())
    }

    /// Insert or replace raw records. Returns how many were written.
    pub async fn upsert_raw(&self, collection: Collection, records: &[Value]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let written = upsert_in_tx(&mut tx, collection, records).await?;
        tx.commit().await?;

        self.notify(collection);
        Ok(written)
    }

    /// Replace a whole collection with `records`.
    pub async fn replace_collection(&self, collection: Collection, records: &[Value]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM entities WHERE collection = ?")
            .bind(collection.as_str())
            .execute(&mut *tx)
            .await?;
        let written = upsert_in_tx(&mut tx, collection, records).await?;
        tx.commit().await?;

        tracing::debug!(collection = %collection, count = written, "Collection replaced");
        self.notify(collection);
        Ok(written)
    }

    pub async fn delete(&self, collection: Collection, ids: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let deleted = delete_in_tx(&mut tx, collection, ids).await?;
        tx.commit().await?;

        self.notify(collection);
        Ok(deleted)
    }

    /// Apply a sync delta atomically.
    ///
    /// Applying the same delta twice leaves the same state as applying it once.
    pub async fn apply_changes(&self, changes: &ChangeSet) -> Result<AppliedChanges> {
        let mut applied = AppliedChanges::default();
        let mut touched: Vec<Collection> = Vec::new();

        let mut tx = self.pool.begin().await?;

        if changes.wipe {
            sqlx::query("DELETE FROM entities").execute(&mut *tx).await?;
            applied.wiped = true;
            touched.extend(Collection::ALL);
        }

        for (collection, records) in changes.upserts() {
            applied.upserted += upsert_in_tx(&mut tx, collection, records).await?;
            touched.push(collection);
        }

        for (collection, ids) in changes.deletions() {
            applied.deleted += delete_in_tx(&mut tx, collection, ids).await?;
            touched.push(collection);
        }

        tx.commit().await?;

        touched.sort_by_key(|c| c.as_str());
        touched.dedup();
        for collection in touched {
            self.notify(collection);
        }

        Ok(applied)
    }

    /// Remove every cached record.
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM entities").execute(&self.pool).await?;
        for collection in Collection::ALL {
            self.notify(collection);
        }
        tracing::info!("Local cache cleared");
        Ok(())
    }

    // ─── Change notification ─────────────────────────────────────

    /// Receiver whose value changes after every write to `collection`.
    pub fn subscribe(&self, collection: Collection) -> watch::Receiver<u64> {
        self.revisions
            .entry(collection)
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    fn notify(&self, collection: Collection) {
        if let Some(sender) = self.revisions.get(&collection) {
            sender.send_modify(|rev| *rev += 1);
        }
    }
}

const UPSERT_SQL: &str = r#"
    INSERT INTO entities (collection, id, body) VALUES (?, ?, ?)
    ON CONFLICT (collection, id) DO UPDATE SET body = excluded.body
"#;

async fn upsert_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    collection: Collection,
    records: &[Value],
) -> Result<usize> {
    let mut written = 0;
    for record in records {
        let Some(id) = record_id(record) else {
            tracing::warn!(collection = %collection, "Skipping record without id");
            continue;
        };
        sqlx::query(UPSERT_SQL)
            .bind(collection.as_str())
            .bind(id)
            .bind(serde_json::to_string(record)?)
            .execute(&mut **tx)
            .await?;
        written += 1;
    }
    Ok(written)
}

async fn delete_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    collection: Collection,
    ids: &[String],
) -> Result<usize> {
    let mut deleted = 0;
    for id in ids {
        let result = sqlx::query("DELETE FROM entities WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .execute(&mut **tx)
            .await?;
        deleted += result.rows_affected() as usize;
    }
    Ok(deleted)
}

/// Record id as a string. Sheets-backed ids sometimes arrive as numbers.
fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
