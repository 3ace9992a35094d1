// Integration tests for the PubNub REST client against a local stand-in server

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use device_logs::config::{ClientConfig, Credentials};
use device_logs::device::Device;
use device_logs::error::LogsError;
use device_logs::logs::{LogClient, LogEvent, LogLine};
use device_logs::provider::{HistoryOptions, ProviderClient, PubNubClient};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, timeout, Duration};

const SUBSCRIBE_KEY: &str = "sub-c-test";
const PUBLISH_KEY: &str = "pub-c-test";
const SERVER_TIME: u64 = 15_000_000_000_000_000;

#[derive(Default)]
struct FakePubNub {
    published: Mutex<Vec<(String, String)>>,
    history: Mutex<HashMap<String, Vec<Value>>>,
    history_queries: Mutex<Vec<(String, HashMap<String, String>)>>,
    pending: Mutex<Vec<Value>>,
}

type Shared = Arc<FakePubNub>;

async fn time_handler() -> Json<Value> {
    Json(json!([SERVER_TIME]))
}

async fn publish_handler(
    State(state): State<Shared>,
    Path((pub_key, _sub_key, channel, message)): Path<(String, String, String, String)>,
) -> (StatusCode, Json<Value>) {
    if pub_key != PUBLISH_KEY {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!([0, "Invalid Key", "0"])),
        );
    }

    state.published.lock().unwrap().push((channel, message));
    (
        StatusCode::OK,
        Json(json!([1, "Sent", (SERVER_TIME + 1).to_string()])),
    )
}

async fn history_handler(
    State(state): State<Shared>,
    Path((sub_key, channel)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if sub_key != SUBSCRIBE_KEY {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"status": 403, "error": true, "message": "Forbidden"})),
        );
    }

    state
        .history_queries
        .lock()
        .unwrap()
        .push((channel.clone(), params));
    let entries = state
        .history
        .lock()
        .unwrap()
        .get(&channel)
        .cloned()
        .unwrap_or_default();
    (StatusCode::OK, Json(json!([entries, 0, 0])))
}

async fn subscribe_handler(
    State(state): State<Shared>,
    Path((sub_key, _channels)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if sub_key != SUBSCRIBE_KEY {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"status": 403, "error": true, "message": "Forbidden"})),
        );
    }

    let tt: u64 = params
        .get("tt")
        .and_then(|tt| tt.parse().ok())
        .unwrap_or(0);
    if tt == 0 {
        return (
            StatusCode::OK,
            Json(json!({"t": {"t": "100", "r": 1}, "m": []})),
        );
    }

    for _ in 0..100 {
        let messages: Vec<Value> = std::mem::take(&mut *state.pending.lock().unwrap());
        if !messages.is_empty() {
            return (
                StatusCode::OK,
                Json(json!({"t": {"t": (tt + 1).to_string(), "r": 1}, "m": messages})),
            );
        }
        sleep(Duration::from_millis(20)).await;
    }

    (
        StatusCode::OK,
        Json(json!({"t": {"t": tt.to_string(), "r": 1}, "m": []})),
    )
}

async fn start_server(state: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/time/0", get(time_handler))
        .route(
            "/publish/:pub_key/:sub_key/0/:channel/0/:message",
            get(publish_handler),
        )
        .route(
            "/v2/history/sub-key/:sub_key/channel/:channel",
            get(history_handler),
        )
        .route("/v2/subscribe/:sub_key/:channels/0", get(subscribe_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::new(Credentials::new(SUBSCRIBE_KEY, PUBLISH_KEY));
    config.origin = addr.to_string();
    config.ssl = false;
    config.uuid = Some("test-client".to_string());
    config.request_timeout_secs = 5;
    config.subscribe_timeout_secs = 10;
    config.reconnect_delay_ms = 50;
    config
}

#[tokio::test]
async fn test_time() {
    let addr = start_server(Arc::new(FakePubNub::default())).await;
    let client = PubNubClient::new(&config_for(addr)).unwrap();

    assert_eq!(client.time().await.unwrap(), SERVER_TIME);
}

#[tokio::test]
async fn test_publish() {
    let state = Arc::new(FakePubNub::default());
    let addr = start_server(state.clone()).await;
    let client = PubNubClient::new(&config_for(addr)).unwrap();

    let response = client
        .publish("device-abc123-logs-clear", &json!(SERVER_TIME))
        .await
        .unwrap();

    assert_eq!(response.timetoken, SERVER_TIME + 1);
    assert_eq!(
        *state.published.lock().unwrap(),
        vec![(
            "device-abc123-logs-clear".to_string(),
            SERVER_TIME.to_string()
        )]
    );
}

#[tokio::test]
async fn test_publish_rejected() {
    let addr = start_server(Arc::new(FakePubNub::default())).await;
    let mut config = config_for(addr);
    config.credentials.publish_key = "pub-c-wrong".to_string();
    let client = PubNubClient::new(&config).unwrap();

    let result = client.publish("any", &json!("x")).await;

    assert!(matches!(
        result,
        Err(LogsError::Provider { status: 400, .. })
    ));
}

#[tokio::test]
async fn test_history_sends_options() {
    let state = Arc::new(FakePubNub::default());
    state.history.lock().unwrap().insert(
        "device-abc123-logs".to_string(),
        vec![json!({"m": "a"}), json!({"m": "b"})],
    );
    let addr = start_server(state.clone()).await;
    let client = PubNubClient::new(&config_for(addr)).unwrap();

    let options = HistoryOptions {
        count: Some(2),
        start: None,
        end: Some(SERVER_TIME),
        reverse: Some(false),
    };
    let entries = client.history("device-abc123-logs", &options).await.unwrap();

    assert_eq!(entries, vec![json!({"m": "a"}), json!({"m": "b"})]);

    let queries = state.history_queries.lock().unwrap();
    let (channel, params) = &queries[0];
    assert_eq!(channel, "device-abc123-logs");
    assert_eq!(params.get("count").map(String::as_str), Some("2"));
    assert_eq!(
        params.get("end").map(String::as_str),
        Some("15000000000000000")
    );
    assert_eq!(params.get("reverse").map(String::as_str), Some("false"));
    assert_eq!(params.get("start"), None);
    assert_eq!(params.get("uuid").map(String::as_str), Some("test-client"));
}

#[tokio::test]
async fn test_history_forbidden() {
    let addr = start_server(Arc::new(FakePubNub::default())).await;
    let mut config = config_for(addr);
    config.credentials.subscribe_key = "sub-c-wrong".to_string();
    let client = PubNubClient::new(&config).unwrap();

    let result = client
        .history("device-abc123-logs", &HistoryOptions::default())
        .await;

    match result {
        Err(LogsError::Provider { status, message }) => {
            assert_eq!(status, 403);
            assert!(message.contains("Forbidden"));
        }
        other => panic!("Expected provider error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_live_subscription_end_to_end() {
    let state = Arc::new(FakePubNub::default());
    let addr = start_server(state.clone()).await;
    let config = config_for(addr);
    let credentials = config.credentials.clone();
    let client = LogClient::pubnub(config);

    let mut subscription = client
        .subscribe(&credentials, &Device::new("abc123"))
        .unwrap();

    state.pending.lock().unwrap().extend([
        json!({"c": "device-abc123-logs", "d": [{"m": "hello", "s": 0, "t": 5}]}),
        json!({"c": "device-abc123-logs-clear", "d": SERVER_TIME}),
    ]);

    let first = timeout(Duration::from_secs(5), subscription.next())
        .await
        .unwrap();
    let second = timeout(Duration::from_secs(5), subscription.next())
        .await
        .unwrap();

    assert_eq!(
        first,
        Some(LogEvent::Line(LogLine::new("hello", false, Some(5))))
    );
    assert_eq!(second, Some(LogEvent::Clear));

    subscription.unsubscribe();
}

#[tokio::test]
async fn test_subscription_reports_network_issues() {
    // Reserve a port, then free it so connections are refused.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = config_for(addr);
    let credentials = config.credentials.clone();
    let client = LogClient::pubnub(config);
    let mut subscription = client
        .subscribe(&credentials, &Device::new("abc123"))
        .unwrap();

    let event = timeout(Duration::from_secs(5), subscription.next())
        .await
        .unwrap();

    assert_eq!(
        event,
        Some(LogEvent::Error("PNNetworkIssuesCategory".to_string()))
    );
}

#[tokio::test]
async fn test_clear_and_history_since_last_clear() {
    let state = Arc::new(FakePubNub::default());
    state.history.lock().unwrap().extend([
        (
            "device-abc123-logs-clear".to_string(),
            vec![json!(SERVER_TIME)],
        ),
        (
            "device-abc123-logs".to_string(),
            vec![json!([{"m": "after clear", "t": 9}])],
        ),
    ]);
    let addr = start_server(state.clone()).await;
    let config = config_for(addr);
    let credentials = config.credentials.clone();
    let client = LogClient::pubnub(config);
    let device = Device::new("abc123");

    let response = client.clear(&credentials, &device).await.unwrap();
    assert_eq!(response.timetoken, SERVER_TIME + 1);

    let lines = client
        .history_since_last_clear(&credentials, &device, &HistoryOptions::default())
        .await
        .unwrap();
    assert_eq!(lines, vec![LogLine::new("after clear", false, Some(9))]);

    let queries = state.history_queries.lock().unwrap();
    let (channel, params) = &queries[1];
    assert_eq!(channel, "device-abc123-logs");
    assert_eq!(params.get("count").map(String::as_str), Some("200"));
    assert_eq!(
        params.get("end").map(String::as_str),
        Some("15000000000000000")
    );
}

#[tokio::test]
async fn test_history_since_last_clear_never_cleared_sends_no_end() {
    let state = Arc::new(FakePubNub::default());
    state.history.lock().unwrap().insert(
        "device-abc123-logs".to_string(),
        vec![json!({"m": "first boot"})],
    );
    let addr = start_server(state.clone()).await;
    let config = config_for(addr);
    let credentials = config.credentials.clone();
    let client = LogClient::pubnub(config);
    let device = Device::new("abc123");

    let lines = client
        .history_since_last_clear(&credentials, &device, &HistoryOptions::default())
        .await
        .unwrap();
    assert_eq!(lines, vec![LogLine::new("first boot", false, None)]);

    let queries = state.history_queries.lock().unwrap();
    let (channel, params) = &queries[1];
    assert_eq!(channel, "device-abc123-logs");
    assert_eq!(params.get("count").map(String::as_str), Some("200"));
    assert_eq!(params.get("end"), None);
    assert_eq!(params.get("start"), None);
}
