// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Repository reads and write-through mutations.

use axum::http::StatusCode;
use chorequest_client::error::ClientError;
use chorequest_client::models::{Chore, ChoreStatus, Collection, RedemptionStatus};
use chorequest_client::services::BatchOperation;
use serde_json::json;
use std::io::Cursor;

mod common;
use common::{log_in, test_client, test_client_at, FakeBackend, TestClient};

async fn logged_in_client(backend: &FakeBackend) -> TestClient {
    let t = test_client(backend).await;
    log_in(&t.client);
    t.client.tokens.store_tokens("abc", None, Some(3600));
    t
}

fn local_chore() -> Chore {
    serde_json::from_value(json!({
        "id": "",
        "title": "Feed the cat",
        "pointValue": 3,
        "assignedTo": ["u-kid"]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_create_caches_server_copy() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    backend.reply(
        "chores",
        "create",
        json!({
            "success": true,
            "item": { "id": "c9", "title": "Feed the cat (daily)", "pointValue": 3, "status": "pending" }
        }),
    );

    let saved = t.client.chores.create(&local_chore()).await.unwrap();
    assert_eq!(saved.id, "c9");

    let cached = t.client.chores.get("c9").await.unwrap().unwrap();
    assert_eq!(cached.title, "Feed the cat (daily)");
    assert_eq!(t.client.cache.count(Collection::Chores).await.unwrap(), 1);

    let call = &backend.calls_to("chores", "create")[0];
    assert_eq!(call.method, axum::http::Method::POST);
    assert_eq!(call.body.as_ref().unwrap()["item"]["title"], "Feed the cat");
    assert_eq!(call.query["token"], "auth-tok");
}

#[tokio::test]
async fn test_failed_write_leaves_cache_alone() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    backend.reply(
        "chores",
        "create",
        json!({ "success": false, "error": "Only parents can create chores" }),
    );

    assert!(matches!(
        t.client.chores.create(&local_chore()).await,
        Err(ClientError::Backend(_))
    ));
    assert_eq!(t.client.cache.count(Collection::Chores).await.unwrap(), 0);
}

#[tokio::test]
async fn test_refresh_replaces_collection() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    t.client
        .cache
        .upsert_raw(Collection::Chores, &[json!({ "id": "stale", "title": "Old" })])
        .await
        .unwrap();
    backend.reply(
        "chores",
        "list",
        json!({ "success": true, "items": [ { "id": "c1", "title": "Dishes" } ] }),
    );

    assert_eq!(t.client.chores.refresh().await.unwrap(), 1);
    let ids: Vec<String> = t
        .client
        .chores
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec!["c1"]);
}

#[tokio::test]
async fn test_delete_removes_locally_after_backend() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    t.client
        .cache
        .upsert_raw(Collection::Chores, &[json!({ "id": "c1", "title": "Dishes" })])
        .await
        .unwrap();

    backend.reply("chores", "delete", json!({ "success": false, "error": "Locked" }));
    assert!(t.client.chores.delete("c1").await.is_err());
    assert!(t.client.chores.get("c1").await.unwrap().is_some());

    let backend2 = FakeBackend::spawn().await;
    let t2 = logged_in_client(&backend2).await;
    t2.client
        .cache
        .upsert_raw(Collection::Chores, &[json!({ "id": "c1", "title": "Dishes" })])
        .await
        .unwrap();
    backend2.reply("chores", "delete", json!({ "success": true }));
    t2.client.chores.delete("c1").await.unwrap();
    assert!(t2.client.chores.get("c1").await.unwrap().is_none());
    assert_eq!(
        backend2.calls_to("chores", "delete")[0].body.as_ref().unwrap()["id"],
        "c1"
    );
}

#[tokio::test]
async fn test_unauthorized_retries_once_with_fresh_token() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    backend.reply_with_status(
        "chores",
        "list",
        StatusCode::UNAUTHORIZED,
        json!({ "success": false, "error": "Unauthorized" }),
    );
    backend.reply(
        "chores",
        "list",
        json!({ "success": true, "items": [ { "id": "c1", "title": "Dishes" } ] }),
    );
    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "xyz", "expiresIn": 1800 }),
    );

    assert_eq!(t.client.chores.refresh().await.unwrap(), 1);

    let lists = backend.calls_to("chores", "list");
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0].query["accessToken"], "abc");
    assert_eq!(lists[1].query["accessToken"], "xyz");
    assert_eq!(backend.count("auth", "refreshToken"), 1);
}

#[tokio::test]
async fn test_unauthorized_twice_gives_up() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    backend.reply(
        "chores",
        "list",
        json!({ "success": false, "errorCode": "UNAUTHORIZED", "error": "Bad token" }),
    );
    backend.reply(
        "auth",
        "refreshToken",
        json!({ "success": true, "accessToken": "xyz", "expiresIn": 1800 }),
    );

    assert!(matches!(
        t.client.chores.refresh().await,
        Err(ClientError::Unauthorized)
    ));
    assert_eq!(backend.count("chores", "list"), 2);
    // An auth failure does not end the session
    assert!(t.client.session().is_some());
}

#[tokio::test]
async fn test_calls_without_access_token_still_go_out() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;
    log_in(&t.client);
    // refreshToken is unscripted, so no access token can be had
    backend.reply("rewards", "list", json!({ "success": true, "items": [] }));

    assert_eq!(t.client.rewards.refresh().await.unwrap(), 0);
    let call = &backend.calls_to("rewards", "list")[0];
    assert!(!call.query.contains_key("accessToken"));
    assert_eq!(call.query["ownerEmail"], "parent@example.com");
}

#[tokio::test]
async fn test_trailing_slash_backend_url_is_rewritten() {
    let backend = FakeBackend::spawn().await;
    let t = test_client_at(&backend, &format!("{}/", backend.url)).await;
    log_in(&t.client);
    t.client.tokens.store_tokens("abc", None, Some(3600));
    backend.reply("users", "list", json!({ "success": true, "items": [] }));

    assert_eq!(t.client.users.refresh().await.unwrap(), 0);
    assert_eq!(backend.count("users", "list"), 1);
}

#[tokio::test]
async fn test_not_logged_in_makes_no_calls() {
    let backend = FakeBackend::spawn().await;
    let t = test_client(&backend).await;

    assert!(matches!(
        t.client.chores.create(&local_chore()).await,
        Err(ClientError::NotLoggedIn)
    ));
    assert!(matches!(
        t.client.refresh_all().await,
        Err(ClientError::NotLoggedIn)
    ));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_observe_sees_writes() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    let mut watcher = t.client.chores.observe();
    assert!(watcher.current().await.unwrap().is_empty());

    backend.reply(
        "chores",
        "list",
        json!({ "success": true, "items": [ { "id": "c1", "title": "Dishes" } ] }),
    );
    t.client.chores.refresh().await.unwrap();

    let chores = watcher.changed().await.unwrap();
    assert_eq!(chores.len(), 1);
    assert_eq!(chores[0].title, "Dishes");
}

#[tokio::test]
async fn test_complete_with_photo_uploads_then_completes() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    backend.reply(
        "photos",
        "upload",
        json!({ "success": true, "url": "https://drive.example/p1", "fileId": "p1" }),
    );
    backend.reply(
        "chores",
        "complete",
        json!({
            "success": true,
            "item": {
                "id": "c1",
                "title": "Dishes",
                "status": "completed",
                "photoUrl": "https://drive.example/p1"
            }
        }),
    );

    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::new(64, 48))
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let chore = t.client.chores.complete_with_photo("c1", &png).await.unwrap();
    assert_eq!(chore.status, ChoreStatus::Completed);

    let upload = backend.calls_to("photos", "upload")[0].body.clone().unwrap();
    assert_eq!(upload["choreId"], "c1");
    assert_eq!(upload["mimeType"], "image/jpeg");
    assert_eq!(
        upload["fileName"],
        format!("c1-{}.jpg", common::t0().timestamp_millis())
    );
    assert!(!upload["data"].as_str().unwrap().is_empty());

    let complete = backend.calls_to("chores", "complete")[0].body.clone().unwrap();
    assert_eq!(complete["photoUrl"], "https://drive.example/p1");
    assert_eq!(
        t.client.chores.get("c1").await.unwrap().unwrap().photo_url.as_deref(),
        Some("https://drive.example/p1")
    );
}

#[tokio::test]
async fn test_non_image_photo_is_rejected_locally() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;

    assert!(matches!(
        t.client.chores.complete_with_photo("c1", b"not an image").await,
        Err(ClientError::BadRequest(_))
    ));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_redeem_caches_redemption() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    backend.reply(
        "rewards",
        "redeem",
        json!({
            "success": true,
            "item": {
                "id": "rd1",
                "rewardId": "r1",
                "userId": "u-parent",
                "pointCost": 20,
                "status": "pending",
                "requestedAt": "2026-03-01T12:00:00.000Z"
            }
        }),
    );

    let redemption = t.client.rewards.redeem("r1").await.unwrap();
    assert_eq!(redemption.status, RedemptionStatus::Pending);
    assert!(t.client.redemptions.get("rd1").await.unwrap().is_some());
    assert_eq!(t.client.cache.count(Collection::Rewards).await.unwrap(), 0);
}

#[tokio::test]
async fn test_batch_result_count_must_match() {
    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    let ops = [
        BatchOperation::new(Collection::Chores, "verify", json!({ "id": "c1", "approved": true })),
        BatchOperation::new(Collection::Chores, "verify", json!({ "id": "c2", "approved": false })),
    ];

    backend.reply(
        "batch",
        "execute",
        json!({ "success": true, "results": [ { "success": true } ] }),
    );
    assert!(matches!(
        t.client.api.batch(&ops).await,
        Err(ClientError::Decode(_))
    ));

    let backend = FakeBackend::spawn().await;
    let t = logged_in_client(&backend).await;
    backend.reply(
        "batch",
        "execute",
        json!({
            "success": true,
            "results": [ { "success": true }, { "success": false, "error": "Already verified" } ]
        }),
    );
    let results = t.client.api.batch(&ops).await.unwrap();
    assert!(results[0].success);
    assert_eq!(results[1].error.as_deref(), Some("Already verified"));
    assert_eq!(
        backend.calls_to("batch", "execute")[0].body.as_ref().unwrap()["operations"][1]["path"],
        "chores"
    );
}
