// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Rewards and their redemptions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub point_cost: i64,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Remaining stock; `None` means unlimited
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    #[default]
    Pending,
    Approved,
    Denied,
    Fulfilled,
}

/// A child's request to spend points on a reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRedemption {
    pub id: String,
    pub reward_id: String,
    pub user_id: String,
    #[serde(default)]
    pub point_cost: i64,
    #[serde(default)]
    pub status: RedemptionStatus,
    pub requested_at: String,
    #[serde(default)]
    pub resolved_at: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}
