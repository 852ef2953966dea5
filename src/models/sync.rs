// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! "Changes since timestamp" payload returned by the sync endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Collection;

/// Per-collection deltas since the requested timestamp.
///
/// Records are kept as raw JSON: the cache stores the backend's body
/// verbatim, so nothing is lost for fields this client does not model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Backend clock at the time the delta was computed
    pub server_time: Option<DateTime<Utc>>,
    /// Upserted records keyed by collection name
    #[serde(default)]
    pub changes: BTreeMap<String, Vec<serde_json::Value>>,
    /// Deleted record ids keyed by collection name
    #[serde(default)]
    pub deleted: BTreeMap<String, Vec<String>>,
    /// Backend asks the device to drop all local data before applying
    #[serde(default)]
    pub wipe: bool,
}

impl ChangeSet {
    /// Upserts for known collections. Unknown keys are skipped.
    pub fn upserts(&self) -> impl Iterator<Item = (Collection, &[serde_json::Value])> {
        self.changes.iter().filter_map(|(key, records)| {
            let collection = Collection::from_key(key);
            if collection.is_none() {
                tracing::warn!(collection = %key, "Ignoring changes for unknown collection");
            }
            collection.map(|c| (c, records.as_slice()))
        })
    }

    /// Deletions for known collections. Unknown keys are skipped.
    pub fn deletions(&self) -> impl Iterator<Item = (Collection, &[String])> {
        self.deleted
            .iter()
            .filter_map(|(key, ids)| Collection::from_key(key).map(|c| (c, ids.as_slice())))
    }

    /// Total number of upserted and deleted records.
    pub fn len(&self) -> usize {
        self.changes.values().map(Vec::len).sum::<usize>()
            + self.deleted.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && !self.wipe
    }
}
