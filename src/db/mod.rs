//! Local persistence: encrypted preferences, the session, and the record cache.

pub mod cache;
pub mod secure_store;
pub mod session_store;

pub use cache::{AppliedChanges, LocalCache};
pub use secure_store::{SecureStore, StoreError};
pub use session_store::SessionStore;

/// Secure store key names.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "drive_access_token";
    pub const REFRESH_TOKEN: &str = "drive_refresh_token";
    /// Access token expiry, epoch milliseconds
    pub const TOKEN_EXPIRY: &str = "drive_token_expiry";
    pub const DEVICE_SESSION: &str = "device_session";
    pub const DEVICE_ID: &str = "device_id";

    /// Everything the token manager owns.
    pub const TOKEN_KEYS: [&str; 3] = [ACCESS_TOKEN, REFRESH_TOKEN, TOKEN_EXPIRY];
}

/// File name of the cache database inside the data directory.
pub const CACHE_DB_FILE: &str = "cache.sqlite";
