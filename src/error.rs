// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client error types.
//!
//! Everything that crosses the repository/facade boundary is a
//! [`ClientError`]; lower layers have their own enums that convert into it.

use crate::db::secure_store::StoreError;

/// Crate-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Backend rejected credentials")]
    Unauthorized,

    #[error("Session revoked by backend (token version mismatch)")]
    SessionRevoked,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Local storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Local cache error: {0}")]
    Cache(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Backend error code for a revoked session.
    pub const TOKEN_VERSION_MISMATCH: &'static str = "TOKEN_VERSION_MISMATCH";

    /// Backend error code for rejected credentials.
    pub const UNAUTHORIZED: &'static str = "UNAUTHORIZED";

    /// Whether retrying after a forced token refresh could help.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// Whether the error came from the transport rather than the backend.
    pub fn is_network_error(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
