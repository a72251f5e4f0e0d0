//! End-to-end tests for the dashboard API.
//!
//! Each test binds the real router to a random port; third-party services
//! (forecast, CRM, chat bot) are replaced by small axum servers.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use taskdash::config::Config;
use taskdash::kv::{KvStore, MemoryKv, TASKS_KEY};
use taskdash::server::{router, AppState};

// =============================================================================
// Harness
// =============================================================================

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_api(config: Config, kv: Option<Arc<dyn KvStore>>) -> String {
    let state = AppState::new(config, kv).unwrap();
    let addr = spawn(router(state)).await;
    format!("http://{}/api", addr)
}

async fn start_api_with_store(config: Config) -> (String, Arc<MemoryKv>) {
    let kv = Arc::new(MemoryKv::new());
    let base = start_api(config, Some(kv.clone() as Arc<dyn KvStore>)).await;
    (base, kv)
}

async fn get_json(url: &str) -> (StatusCode, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

async fn post_json(url: &str, body: Value) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

// =============================================================================
// Mock upstreams
// =============================================================================

#[derive(Default)]
struct Recorded {
    calls: Mutex<Vec<(String, Value)>>,
}

async fn mock_forecast(
    State(seen): State<Arc<Recorded>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    seen.calls
        .lock()
        .await
        .push(("forecast".to_string(), json!(params)));
    Json(json!({
        "current": {
            "temperature_2m": 88.6,
            "relative_humidity_2m": 12.0,
            "weather_code": 2,
            "wind_speed_10m": 5.5
        }
    }))
}

async fn mock_contacts(headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer good-key");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    Json(json!({
        "contacts": [
            {"id": "c1", "contactName": "Ana Ruiz", "source": "website", "dateAdded": "2026-10-01T10:00:00Z"},
            {"id": "c2", "firstName": "Bo"}
        ],
        "meta": {"total": 150}
    }))
    .into_response()
}

async fn mock_bot_method(
    State(seen): State<Arc<Recorded>>,
    Path(method): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.calls.lock().await.push((method.clone(), body));
    if method == "sendMessage" {
        Json(json!({"ok": true, "result": {"message_id": 77}}))
    } else {
        Json(json!({"ok": true, "result": true}))
    }
}

async fn mock_bot_refusing_edits(
    State(seen): State<Arc<Recorded>>,
    Path(method): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.calls.lock().await.push((method.clone(), body));
    if method == "editMessageText" {
        Json(json!({"ok": false, "error_code": 400, "description": "Bad Request: message to edit not found"}))
    } else {
        Json(json!({"ok": true, "result": true}))
    }
}

async fn start_mock_bot() -> (String, Arc<Recorded>) {
    let seen = Arc::new(Recorded::default());
    let app = Router::new()
        .route("/bottest-token/{method}", post(mock_bot_method))
        .with_state(seen.clone());
    (format!("http://{}", spawn(app).await), seen)
}

fn telegram_config(api_base: &str) -> Config {
    let mut config = Config::default();
    config.telegram.api_base = api_base.to_string();
    config.telegram.bot_token = Some("test-token".to_string());
    config
}

// =============================================================================
// Health and task slots
// =============================================================================

#[tokio::test]
async fn health_reports_service() {
    let base = start_api(Config::default(), None).await;
    let (status, body) = get_json(&format!("{base}/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["service"], "taskdash");
}

#[tokio::test]
async fn tasks_without_store_are_unavailable() {
    let base = start_api(Config::default(), None).await;

    let (status, body) = get_json(&format!("{base}/tasks")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"success": false, "error": "KV not configured"}));

    let (status, _) = post_json(&format!("{base}/tasks"), json!({"tasks": []})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn empty_store_returns_no_tasks() {
    let (base, _) = start_api_with_store(Config::default()).await;
    let (status, body) = get_json(&format!("{base}/tasks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "tasks": []}));
}

#[tokio::test]
async fn saved_tasks_come_back() {
    let (base, kv) = start_api_with_store(Config::default()).await;
    let task = json!({
        "id": "t1",
        "text": "Call the vendor",
        "status": "todo",
        "category": "wedding",
        "priority": "high",
        "assignee": "owner",
        "dueDate": "2026-10-20",
        "createdAt": "2026-10-19T08:00:00Z"
    });

    let (status, body) = post_json(&format!("{base}/tasks"), json!({"tasks": [task]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "saved": 1}));
    assert!(kv.get(TASKS_KEY).await.unwrap().is_some());

    let (_, body) = get_json(&format!("{base}/tasks")).await;
    let saved = &body["tasks"][0];
    assert_eq!(saved["id"], "t1");
    assert_eq!(saved["text"], "Call the vendor");
    assert_eq!(saved["status"], "todo");
    assert_eq!(saved["priority"], "high");
    assert_eq!(saved["dueDate"], "2026-10-20");
}

#[tokio::test]
async fn saving_replaces_the_whole_collection() {
    let (base, _) = start_api_with_store(Config::default()).await;
    let task = |id: &str| {
        json!({"id": id, "text": id, "status": "todo", "createdAt": "2026-10-19T08:00:00Z"})
    };

    post_json(&format!("{base}/tasks"), json!({"tasks": [task("a"), task("b")]})).await;
    post_json(&format!("{base}/tasks"), json!({"tasks": [task("c")]})).await;

    let (_, body) = get_json(&format!("{base}/tasks")).await;
    let ids: Vec<&str> = body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["c"]);
}

#[tokio::test]
async fn legacy_blobs_are_read() {
    let (base, kv) = start_api_with_store(Config::default()).await;
    kv.put(
        TASKS_KEY,
        r#"[{"id":"old","title":"Book venue","completed":true,"createdAt":"2025-01-01T00:00:00Z"}]"#,
    )
    .await
    .unwrap();

    let (_, body) = get_json(&format!("{base}/tasks")).await;
    let task = &body["tasks"][0];
    assert_eq!(task["text"], "Book venue");
    assert_eq!(task["status"], "done");
    assert_eq!(task["category"], "general");
}

#[tokio::test]
async fn malformed_task_payload_is_rejected() {
    let (base, _) = start_api_with_store(Config::default()).await;
    let (status, body) = post_json(&format!("{base}/tasks"), json!({"tasks": "nope"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn research_items_round_trip() {
    let (base, _) = start_api_with_store(Config::default()).await;
    let items = json!([{"title": "Tent vendors", "links": 3}, "free-form note"]);

    let (status, body) = post_json(&format!("{base}/research"), json!({"items": items})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["saved"], 2);

    let (_, body) = get_json(&format!("{base}/research")).await;
    assert_eq!(body["items"], items);
}

// =============================================================================
// Weather
// =============================================================================

#[tokio::test]
async fn weather_falls_back_when_upstream_is_down() {
    let mut config = Config::default();
    config.weather.base_url = "http://127.0.0.1:1".to_string();
    let base = start_api(config, None).await;

    let (status, body) = get_json(&format!("{base}/weather")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"temp": 72, "condition": "Sunny", "humidity": 25, "wind": 8.0, "location": "Indio, CA"})
    );
}

#[tokio::test]
async fn weather_reads_current_conditions() {
    let seen = Arc::new(Recorded::default());
    let upstream = spawn(
        Router::new()
            .route("/v1/forecast", get(mock_forecast))
            .with_state(seen.clone()),
    )
    .await;

    let mut config = Config::default();
    config.weather.base_url = format!("http://{upstream}");
    let base = start_api(config, None).await;

    let (_, body) = get_json(&format!("{base}/weather?lat=34.1&lon=-118.2")).await;
    assert_eq!(body["temp"], 89);
    assert_eq!(body["condition"], "Partly Cloudy");
    assert_eq!(body["humidity"], 12);
    assert_eq!(body["wind"], 5.5);

    let calls = seen.calls.lock().await;
    let params = &calls[0].1;
    assert_eq!(params["latitude"], "34.1");
    assert_eq!(params["longitude"], "-118.2");
    assert_eq!(params["temperature_unit"], "fahrenheit");
}

#[tokio::test]
async fn weather_ignores_unparseable_coordinates() {
    let seen = Arc::new(Recorded::default());
    let upstream = spawn(
        Router::new()
            .route("/v1/forecast", get(mock_forecast))
            .with_state(seen.clone()),
    )
    .await;

    let mut config = Config::default();
    config.weather.base_url = format!("http://{upstream}");
    let base = start_api(config, None).await;

    let (status, _) = get_json(&format!("{base}/weather?lat=north")).await;
    assert_eq!(status, StatusCode::OK);
    let calls = seen.calls.lock().await;
    assert_eq!(calls[0].1["latitude"], "33.7205");
}

// =============================================================================
// CRM
// =============================================================================

#[tokio::test]
async fn crm_without_credentials_is_unavailable() {
    let base = start_api(Config::default(), None).await;
    let (status, body) = get_json(&format!("{base}/crm/contacts")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "CRM credentials not configured");
}

#[tokio::test]
async fn crm_passes_upstream_status_through() {
    let upstream = spawn(Router::new().route("/contacts", get(mock_contacts))).await;
    let mut config = Config::default();
    config.crm.base_url = format!("http://{upstream}");
    config.crm.api_key = Some("stale-key".to_string());
    config.crm.location_id = Some("loc-1".to_string());
    let base = start_api(config, None).await;

    let (status, body) = get_json(&format!("{base}/crm/contacts")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"success": false, "error": "API error: 401"}));
}

#[tokio::test]
async fn crm_contacts_become_conversations() {
    let upstream = spawn(Router::new().route("/contacts", get(mock_contacts))).await;
    let mut config = Config::default();
    config.crm.base_url = format!("http://{upstream}");
    config.crm.api_key = Some("good-key".to_string());
    config.crm.location_id = Some("loc-1".to_string());
    let base = start_api(config, None).await;

    let (status, body) = get_json(&format!("{base}/crm/contacts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unreadCount"], 99);
    assert_eq!(body["contacts"], 150);
    assert_eq!(body["conversations"][0]["contactName"], "Ana Ruiz");
    assert_eq!(body["conversations"][0]["lastMessage"], "Source: website");
    assert_eq!(body["conversations"][1]["contactName"], "Bo");
    assert_eq!(body["conversations"][1]["type"], "contact");
}

// =============================================================================
// Mail
// =============================================================================

#[tokio::test]
async fn mail_serves_sample_inbox() {
    let base = start_api(Config::default(), None).await;
    let (status, body) = get_json(&format!("{base}/mail")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unreadCount"], 5);
    assert_eq!(body["emails"].as_array().unwrap().len(), 3);
    assert_eq!(body["emails"][0]["from"], "WeddingWire");
}

// =============================================================================
// Chat bot
// =============================================================================

#[tokio::test]
async fn send_requires_chat_and_text() {
    let (bot, _) = start_mock_bot().await;
    let base = start_api(telegram_config(&bot), None).await;

    let (status, body) =
        post_json(&format!("{base}/telegram/send"), json!({"chatId": 42})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing chatId or text");
}

#[tokio::test]
async fn send_without_token_is_unavailable() {
    let base = start_api(Config::default(), None).await;
    let (status, body) = post_json(
        &format!("{base}/telegram/send"),
        json!({"chatId": 42, "text": "Today"}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn send_builds_task_keyboard() {
    let (bot, seen) = start_mock_bot().await;
    let base = start_api(telegram_config(&bot), None).await;

    let (status, body) = post_json(
        &format!("{base}/telegram/send"),
        json!({
            "chatId": 42,
            "text": "<b>Today</b>",
            "tasks": [
                {"id": "a", "text": "Call the vendor about the tent rental"},
                {"id": "b", "text": "Email"},
                {"id": "c", "title": "Pay"}
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "messageId": 77}));

    let calls = seen.calls.lock().await;
    let (method, sent) = &calls[0];
    assert_eq!(method, "sendMessage");
    assert_eq!(sent["chat_id"], 42);
    assert_eq!(sent["parse_mode"], "HTML");

    let rows = sent["reply_markup"]["inline_keyboard"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].as_array().unwrap().len(), 2);
    assert_eq!(rows[0][0]["text"], "▶️ Call the vendor abou...");
    assert_eq!(rows[0][0]["callback_data"], "start_a");
    assert_eq!(rows[1][0]["text"], "▶️ Pay");
    assert_eq!(rows[2][0]["callback_data"], "done_all");
}

#[tokio::test]
async fn webhook_records_button_presses() {
    let (bot, seen) = start_mock_bot().await;
    let base = start_api(telegram_config(&bot), None).await;

    let (status, body) = post_json(
        &format!("{base}/telegram/webhook"),
        json!({
            "update_id": 1,
            "callback_query": {
                "id": "cb-1",
                "data": "start_a",
                "message": {"message_id": 77, "chat": {"id": 42}}
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "action": "start", "taskId": "a"}));

    let methods: Vec<String> = seen
        .calls
        .lock()
        .await
        .iter()
        .map(|(m, _)| m.clone())
        .collect();
    assert_eq!(methods, vec!["answerCallbackQuery", "editMessageText"]);

    let (_, body) = get_json(&format!("{base}/telegram/poll?chatId=42")).await;
    let actions = body["actions"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["action"], "start");
    assert_eq!(actions[0]["taskId"], "a");
}

#[tokio::test]
async fn webhook_acknowledges_other_updates() {
    let (bot, seen) = start_mock_bot().await;
    let base = start_api(telegram_config(&bot), None).await;

    let (status, body) = post_json(
        &format!("{base}/telegram/webhook"),
        json!({"update_id": 2, "message": {"text": "hi"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    assert!(seen.calls.lock().await.is_empty());
}

#[tokio::test]
async fn recorded_actions_are_polled_per_chat() {
    let base = start_api(Config::default(), None).await;

    let (_, body) = post_json(
        &format!("{base}/telegram/poll"),
        json!({"chatId": "team", "action": "done", "taskId": "b"}),
    )
    .await;
    assert_eq!(body["message"], "Action recorded");

    let (_, body) = get_json(&format!("{base}/telegram/poll?chatId=team")).await;
    assert_eq!(body["actions"][0]["action"], "done");

    let (_, body) = get_json(&format!("{base}/telegram/poll?chatId=other")).await;
    assert_eq!(body["actions"], json!([]));

    let (_, body) = get_json(&format!("{base}/telegram/poll")).await;
    assert_eq!(body["message"], "Poll endpoint ready");
}

#[tokio::test]
async fn refused_edit_still_records_the_press() {
    let seen = Arc::new(Recorded::default());
    let bot = spawn(
        Router::new()
            .route("/bottest-token/{method}", post(mock_bot_refusing_edits))
            .with_state(seen.clone()),
    )
    .await;
    let base = start_api(telegram_config(&format!("http://{bot}")), None).await;

    let (status, body) = post_json(
        &format!("{base}/telegram/webhook"),
        json!({
            "update_id": 3,
            "callback_query": {
                "id": "cb-2",
                "data": "done_b",
                "message": {"message_id": 12, "chat": {"id": 42}}
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "action": "done", "taskId": "b"}));
    assert_eq!(seen.calls.lock().await.len(), 2);

    let (_, body) = get_json(&format!("{base}/telegram/poll?chatId=42")).await;
    assert_eq!(body["actions"][0]["action"], "done");
}
