// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Chore model.

use serde::{Deserialize, Serialize};

/// Chore lifecycle as tracked by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoreStatus {
    #[default]
    Pending,
    /// Marked done by the child, awaiting a parent
    Completed,
    /// Approved by a parent; points awarded
    Verified,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chore {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// User ids this chore is assigned to
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub point_value: i64,
    /// Due date (ISO 8601)
    #[serde(default)]
    pub due_date: Option<String>,
    /// Recurrence rule, e.g. "daily" or "weekly:mon,thu"
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub status: ChoreStatus,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub verified_by: Option<String>,
    /// Proof photo stored in Drive
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}
