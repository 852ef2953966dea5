// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token caching and refresh against a fake backend.

use chorequest_client::db::keys;
use chrono::Duration;
use serde_json::json;

mod common;
use common::{log_in, t0, test_client, FakeBackend};

#[tokio::test]
async fn test_valid_stored_token_needs_no_network() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    t.client.tokens.store_tokens("abc", None, Some(3600));
    t.clock.set(t0() + Duration::seconds(100));

    assert_eq!(t.client.get_valid_access_token().await.as_deref(), Some("abc"));
    assert_eq!(backend.total_calls(), 0, "No HTTP request expected");
}

#[tokio::test]
async fn test_expired_token_refreshes_exactly_once() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    t.client.tokens.store_tokens("abc", None, Some(3600));
    t.clock.set(t0() + Duration::seconds(3700));
    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "xyz", "expiresIn": 1800 }),
    );

    assert_eq!(t.client.get_valid_access_token().await.as_deref(), Some("xyz"));
    assert_eq!(backend.count("auth", "refreshToken"), 1);
    assert_eq!(
        t.client.tokens.stored_expiry(),
        Some(t0() + Duration::seconds(3700 + 1800))
    );

    // Fresh token is now served from storage
    assert_eq!(t.client.get_valid_access_token().await.as_deref(), Some("xyz"));
    assert_eq!(backend.count("auth", "refreshToken"), 1);
}

#[tokio::test]
async fn test_token_at_exact_expiry_is_refreshed() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    t.client.tokens.store_tokens("abc", None, Some(60));
    t.clock.set(t0() + Duration::seconds(60));
    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "next", "expiresIn": 60 }),
    );

    assert_eq!(t.client.get_valid_access_token().await.as_deref(), Some("next"));
    assert_eq!(backend.count("auth", "refreshToken"), 1);
}

#[tokio::test]
async fn test_missing_expires_in_defaults_to_an_hour() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "xyz" }),
    );

    assert_eq!(t.client.get_valid_access_token().await.as_deref(), Some("xyz"));
    assert_eq!(
        t.client.tokens.stored_expiry(),
        Some(t0() + Duration::seconds(3600))
    );
}

#[tokio::test]
async fn test_refresh_request_carries_session_identity() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "xyz", "expiresIn": 1800 }),
    );
    t.client.get_valid_access_token().await;

    let calls = backend.calls_to("auth", "refreshToken");
    assert_eq!(calls.len(), 1);
    let body = calls[0].body.clone().unwrap();
    assert_eq!(body["userId"], "u-parent");
    assert_eq!(body["token"], "auth-tok");
    assert_eq!(body["ownerEmail"], "parent@example.com");
    assert!(body.get("refreshToken").is_none());
}

#[tokio::test]
async fn test_no_session_means_no_token_and_no_network() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;

    assert_eq!(t.client.get_valid_access_token().await, None);
    assert_eq!(t.client.tokens.force_refresh_token().await, None);
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_refresh_failures_yield_none() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    // Envelope failure
    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": false, "error": "Drive unavailable" }),
    );
    assert_eq!(t.client.get_valid_access_token().await, None);

    // Success without a token
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);
    backend.reply("auth", "refreshToken", json!({ "success": true }));
    assert_eq!(t.client.get_valid_access_token().await, None);
    assert!(t.client.store.get(keys::ACCESS_TOKEN).unwrap().is_none());
}

#[tokio::test]
async fn test_unreachable_backend_yields_none() {
    let backend = FakeBackend::spawn().await;
    // Nothing listens on port 9 locally
    let t = common::test_client_at(&backend, "http://127.0.0.1:9/exec").await;
    log_in(&t.client);

    assert_eq!(t.client.get_valid_access_token().await, None);
}

#[tokio::test]
async fn test_force_refresh_discards_stored_token_first() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    t.client.tokens.store_tokens("abc", None, Some(3600));
    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": false, "error": "try later" }),
    );

    assert_eq!(t.client.tokens.force_refresh_token().await, None);
    assert!(t.client.store.get(keys::ACCESS_TOKEN).unwrap().is_none());
    assert!(t.client.tokens.stored_expiry().is_none());
}

#[tokio::test]
async fn test_force_refresh_replaces_valid_token() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    t.client.tokens.store_tokens("abc", None, Some(3600));
    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "forced", "expiresIn": 900 }),
    );

    assert_eq!(
        t.client.tokens.force_refresh_token().await.as_deref(),
        Some("forced")
    );
    assert_eq!(t.client.get_valid_access_token().await.as_deref(), Some("forced"));
    assert_eq!(backend.count("auth", "refreshToken"), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "shared", "expiresIn": 1800 }),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tokens = t.client.tokens.clone();
            tokio::spawn(async move { tokens.get_valid_access_token().await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().as_deref(), Some("shared"));
    }
    assert_eq!(backend.count("auth", "refreshToken"), 1);
}

#[tokio::test]
async fn test_rotated_refresh_token_is_sent_next_time() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    t.client.tokens.store_tokens("abc", Some("refresh-1"), Some(60));
    t.clock.advance(Duration::seconds(120));
    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "second", "expiresIn": 60, "refreshToken": "refresh-2" }),
    );
    t.client.get_valid_access_token().await;

    let first = backend.calls_to("auth", "refreshToken");
    assert_eq!(first[0].body.as_ref().unwrap()["refreshToken"], "refresh-1");
    assert_eq!(
        t.client.store.get(keys::REFRESH_TOKEN).unwrap().as_deref(),
        Some("refresh-2")
    );
}

#[tokio::test]
async fn test_tokens_survive_reopen() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);
    t.client.tokens.store_tokens("abc", None, Some(3600));

    let reopened = common::open_client(&backend.url, &t.dir, t.clock.clone()).await;
    assert!(reopened.session().is_some());
    assert_eq!(reopened.get_valid_access_token().await.as_deref(), Some("abc"));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_out_of_range_lifetime_falls_back_to_default() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "xyz", "expiresIn": i64::MAX }),
    );

    let tokens = t.client.tokens.clone();
    let token = tokio::spawn(async move { tokens.get_valid_access_token().await })
        .await
        .expect("refresh must not panic");
    assert_eq!(token.as_deref(), Some("xyz"));
    assert_eq!(
        t.client.tokens.stored_expiry(),
        Some(t0() + Duration::seconds(3600))
    );
}

#[tokio::test]
async fn test_out_of_range_seeded_lifetime_falls_back_to_default() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);

    t.client.tokens.store_tokens("abc", None, Some(i64::MIN));
    assert_eq!(
        t.client.tokens.stored_expiry(),
        Some(t0() + Duration::seconds(3600))
    );
    assert_eq!(t.client.get_valid_access_token().await.as_deref(), Some("abc"));
}
