// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Device session: who is logged in on this device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Family member role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Parent,
    #[default]
    Child,
    System,
}

/// Locally persisted session record.
///
/// Created on a successful login, overwritten on re-login and deleted on
/// logout or when the backend reports a token version mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSession {
    pub family_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub role: UserRole,
    /// Backend-issued auth token (not the Drive access token)
    pub auth_token: String,
    #[serde(default)]
    pub token_version: u32,
    /// Primary parent's Google account; scopes backend Drive access
    pub owner_email: String,
    pub device_id: String,
    pub logged_in_at: DateTime<Utc>,
    /// `None` until the first successful sync
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl DeviceSession {
    pub fn is_parent(&self) -> bool {
        self.role == UserRole::Parent
    }
}
