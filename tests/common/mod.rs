// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test fixtures: an in-process fake of the Apps Script backend and
//! a client wired to it.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, StatusCode},
    routing::get,
    Json, Router,
};
use chorequest_client::{
    config::ClientConfig,
    db::LocalCache,
    models::{DeviceSession, UserRole},
    time_utils::ManualClock,
    ChoreQuest,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// One request seen by the fake backend.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub action: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<RecordedCall>,
    /// Scripted replies per (path, action). The last one repeats.
    replies: HashMap<(String, String), VecDeque<(StatusCode, Value)>>,
    /// Time to wait before answering, per (path, action)
    delays: HashMap<(String, String), Duration>,
}

/// Fake backend listening on a random local port.
#[derive(Clone)]
pub struct FakeBackend {
    pub url: String,
    state: Arc<Mutex<FakeState>>,
}

#[allow(dead_code)]
impl FakeBackend {
    /// Start the fake on `127.0.0.1:0`. Its URL ends in `/exec`.
    pub async fn spawn() -> Self {
        let state = Arc::new(Mutex::new(FakeState::default()));

        let app = Router::new()
            .route("/exec", get(handle).post(handle))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/exec"),
            state,
        }
    }

    /// Queue a 200 reply for `path`/`action`.
    pub fn reply(&self, path: &str, action: &str, body: Value) {
        self.reply_with_status(path, action, StatusCode::OK, body);
    }

    pub fn reply_with_status(&self, path: &str, action: &str, status: StatusCode, body: Value) {
        self.state
            .lock()
            .unwrap()
            .replies
            .entry((path.to_string(), action.to_string()))
            .or_default()
            .push_back((status, body));
    }

    /// Hold every reply to `path`/`action` for `delay`.
    pub fn delay(&self, path: &str, action: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert((path.to_string(), action.to_string()), delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, path: &str, action: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path && c.action == action)
            .collect()
    }

    pub fn count(&self, path: &str, action: &str) -> usize {
        self.calls_to(path, action).len()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }
}

async fn handle(
    State(state): State<Arc<Mutex<FakeState>>>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let path = query.get("path").cloned().unwrap_or_default();
    let action = query.get("action").cloned().unwrap_or_default();

    let (reply, delay) = {
        let mut state = state.lock().unwrap();
        state.calls.push(RecordedCall {
            method,
            path: path.clone(),
            action: action.clone(),
            query,
            body: serde_json::from_slice(&body).ok(),
        });

        let key = (path, action);
        let delay = state.delays.get(&key).copied();
        let reply = state.replies.get_mut(&key).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });
        (reply, delay)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    match reply {
        Some((status, body)) => (status, Json(body)),
        None => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": "no fake response" })),
        ),
    }
}

/// Reference instant "T" for clock-driven tests.
#[allow(dead_code)]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn t0_clock() -> ManualClock {
    ManualClock::new(t0())
}

/// A client talking to a fake backend, with a manual clock at [`t0`].
#[allow(dead_code)]
pub struct TestClient {
    pub client: ChoreQuest,
    pub clock: Arc<ManualClock>,
    pub backend: FakeBackend,
    pub dir: TempDir,
}

/// Build a client for `backend` with fresh storage.
#[allow(dead_code)]
pub async fn test_client(backend: &FakeBackend) -> TestClient {
    test_client_at(backend, &backend.url).await
}

/// Same as [`test_client`] but with an explicit backend URL.
#[allow(dead_code)]
pub async fn test_client_at(backend: &FakeBackend, url: &str) -> TestClient {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let client = open_client(url, &dir, clock.clone()).await;
    TestClient {
        client,
        clock,
        backend: backend.clone(),
        dir,
    }
}

/// Open a client on existing storage.
#[allow(dead_code)]
pub async fn open_client(url: &str, dir: &TempDir, clock: Arc<ManualClock>) -> ChoreQuest {
    let config = ClientConfig::test_default(url, dir.path());
    let cache = LocalCache::in_memory().await.unwrap();
    ChoreQuest::open_with(config, cache, clock).await.unwrap()
}

#[allow(dead_code)]
pub fn sample_session(device_id: &str) -> DeviceSession {
    DeviceSession {
        family_id: "fam-1".to_string(),
        user_id: "u-parent".to_string(),
        user_name: "Ada".to_string(),
        role: UserRole::Parent,
        auth_token: "auth-tok".to_string(),
        token_version: 1,
        owner_email: "parent@example.com".to_string(),
        device_id: device_id.to_string(),
        logged_in_at: t0(),
        last_synced_at: None,
    }
}

/// Put a session in place without going through a login call.
#[allow(dead_code)]
pub fn log_in(client: &ChoreQuest) -> Arc<DeviceSession> {
    let device_id = client.sessions.device_id().unwrap();
    client.sessions.save(sample_session(&device_id)).unwrap()
}

/// Successful login reply for `family_id`.
#[allow(dead_code)]
pub fn login_reply(family_id: &str, access_token: Option<&str>) -> Value {
    let mut reply = json!({
        "success": true,
        "familyId": family_id,
        "userId": "u-kid",
        "userName": "Bo",
        "role": "child",
        "token": "member-tok",
        "tokenVersion": 3,
        "ownerEmail": "parent@example.com",
    });
    if let Some(token) = access_token {
        reply["accessToken"] = json!(token);
        reply["refreshToken"] = json!("refresh-1");
        reply["expiresIn"] = json!(3600);
    }
    reply
}
