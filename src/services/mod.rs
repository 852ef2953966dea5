// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - backend access and sync logic.

pub mod api;
pub mod auth;
pub mod photo;
pub mod qr;
pub mod repository;
pub mod sync;
pub mod token;
pub mod transport;

pub use api::{ApiClient, BatchOperation, BatchResult, LoginResponse, UploadedPhoto};
pub use auth::AuthService;
pub use photo::{prepare_photo, PhotoError, PreparedPhoto};
pub use qr::{parse_login_code, QrError, QrPayload};
pub use repository::{CollectionWatcher, Repository};
pub use sync::{SyncManager, SyncOutcome};
pub use token::TokenManager;
pub use transport::{normalize_url, Transport};
