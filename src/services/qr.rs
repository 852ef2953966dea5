// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! QR login codes.
//!
//! A parent's device shows `chorequest://login?data=<base64 JSON>`; scanning
//! it on another device logs that family member in.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::models::UserRole;

pub const QR_SCHEME: &str = "chorequest://";

/// How far ahead of our clock a code's timestamp may be.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// QR parsing/validation errors.
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("Not a ChoreQuest login code")]
    NotALoginCode,

    #[error("Login code is not valid base64: {0}")]
    Encoding(String),

    #[error("Login code payload is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Login code is invalid: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Login code expired ({age_secs}s old)")]
    Expired { age_secs: i64 },

    #[error("Login code is dated {ahead_secs}s in the future")]
    FromTheFuture { ahead_secs: i64 },
}

/// Decoded QR login payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    #[validate(length(min = 1))]
    pub family_id: String,
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub token: String,
    /// Token version at the time the code was generated
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub app_version: Option<String>,
    /// Generation time, epoch milliseconds
    pub timestamp: i64,
    #[validate(email)]
    pub owner_email: String,
    #[serde(default)]
    pub drive_folder_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
}

impl QrPayload {
    /// Reject codes older than `max_age`, or dated more than
    /// [`MAX_CLOCK_SKEW_SECS`] ahead of `now`.
    pub fn check_age(&self, now: DateTime<Utc>, max_age: Duration) -> Result<(), QrError> {
        // Only a timestamp far in the past can overflow here.
        let Some(age_millis) = now.timestamp_millis().checked_sub(self.timestamp) else {
            return Err(QrError::Expired { age_secs: i64::MAX });
        };
        let age_secs = age_millis / 1000;

        if age_secs < -MAX_CLOCK_SKEW_SECS {
            return Err(QrError::FromTheFuture { ahead_secs: -age_secs });
        }
        if age_secs > i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX) {
            return Err(QrError::Expired { age_secs });
        }
        Ok(())
    }

    /// Encode as a scannable URI (the format the parent device displays).
    pub fn to_uri(&self) -> Result<String, QrError> {
        let json = serde_json::to_vec(self)?;
        Ok(format!(
            "{}login?data={}",
            QR_SCHEME,
            urlencoding::encode(&STANDARD.encode(json))
        ))
    }
}

/// Parse and validate a scanned code.
///
/// Accepts the full URI or the bare base64 payload.
pub fn parse_login_code(scanned: &str) -> Result<QrPayload, QrError> {
    let scanned = scanned.trim();

    let encoded = match scanned.strip_prefix(QR_SCHEME) {
        Some(rest) => {
            let query = rest
                .strip_prefix("login")
                .and_then(|r| r.trim_start_matches('/').strip_prefix('?'))
                .ok_or(QrError::NotALoginCode)?;
            let data = query
                .split('&')
                .find_map(|pair| pair.strip_prefix("data="))
                .ok_or(QrError::NotALoginCode)?;
            urlencoding::decode(data)
                .map_err(|e| QrError::Encoding(e.to_string()))?
                .into_owned()
        }
        None if scanned.contains("://") => return Err(QrError::NotALoginCode),
        None => scanned.to_string(),
    };

    let bytes = decode_base64(&encoded)?;
    let payload: QrPayload = serde_json::from_slice(&bytes)?;
    payload.validate()?;
    Ok(payload)
}

/// The generating side may use either alphabet, with or without padding.
fn decode_base64(encoded: &str) -> Result<Vec<u8>, QrError> {
    let mut last_err = None;
    for engine in [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD] {
        match engine.decode(encoded) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => last_err = Some(e),
        }
    }
    Err(QrError::Encoding(
        last_err.map(|e| e.to_string()).unwrap_or_default(),
    ))
}
