// PubNub REST client - history, publish, time and a long-poll subscribe loop

use crate::config::{ClientConfig, Credentials};
use crate::error::{LogsError, Result};
use crate::provider::{
    parse_timetoken, HistoryOptions, Listener, ListenerId, ListenerSet, ProviderClient,
    ProviderFactory, ProviderMessage, ProviderStatus, PublishResponse, StatusCategory, Timetoken,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// SDK identifier sent with every request
const PNSDK: &str = concat!("device-logs-rust/", env!("CARGO_PKG_VERSION"));

/// Position of the subscribe loop in the provider's message stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    timetoken: Timetoken,
    region: Option<u32>,
}

#[derive(Default)]
struct SubscribeState {
    channels: BTreeSet<String>,
    cursor: Cursor,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    http: reqwest::Client,
    subscribe_http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    uuid: String,
    reconnect_delay: Duration,
    listeners: ListenerSet,
    state: Mutex<SubscribeState>,
}

/// [`ProviderClient`] backed by the PubNub REST API
pub struct PubNubClient {
    inner: Arc<Inner>,
}

impl PubNubClient {
    /// Create a client from a validated configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let base_url = Url::parse(&config.base_url()).map_err(|e| {
            LogsError::ConfigValidationError(format!("Invalid origin {}: {}", config.origin, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LogsError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let subscribe_http = reqwest::Client::builder()
            .timeout(config.subscribe_timeout())
            .build()
            .map_err(|e| LogsError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let uuid = config
            .uuid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                subscribe_http,
                base_url,
                credentials: config.credentials.clone(),
                uuid,
                reconnect_delay: config.reconnect_delay(),
                listeners: ListenerSet::new(),
                state: Mutex::new(SubscribeState::default()),
            }),
        })
    }

    /// Client identifier reported to the provider
    pub fn uuid(&self) -> &str {
        &self.inner.uuid
    }

    /// Channels currently in the live subscription
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.inner.lock_state().channels.iter().cloned().collect()
    }

    /// Apply a channel set change and restart the subscribe loop to match it
    fn update_channels(&self, apply: impl FnOnce(&mut BTreeSet<String>) -> bool) {
        let mut state = self.inner.lock_state();
        let changed = apply(&mut state.channels);

        // An unchanged, non-empty set still needs a loop if none was ever started.
        let needs_start = state.task.is_none() && !state.channels.is_empty();
        if !changed && !needs_start {
            return;
        }

        if let Some(task) = state.task.take() {
            task.abort();
        }

        if state.channels.is_empty() {
            state.cursor = Cursor::default();
            drop(state);

            info!("subscribe loop stopped, no channels left");
            self.inner.listeners.announce_status(&ProviderStatus::new(
                StatusCategory::Disconnected,
                Vec::new(),
            ));
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no tokio runtime available, subscribe loop not started");
                return;
            }
        };

        let channels: Vec<String> = state.channels.iter().cloned().collect();
        info!(channels = ?channels, "starting subscribe loop");
        state.task = Some(handle.spawn(run_subscribe_loop(Arc::clone(&self.inner), channels)));
    }
}

impl Drop for PubNubClient {
    fn drop(&mut self) {
        if let Some(task) = self.inner.lock_state().task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl ProviderClient for PubNubClient {
    fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.remove(id);
    }

    fn subscribe(&self, channels: &[String]) {
        self.update_channels(|current| {
            let mut changed = false;
            for channel in channels {
                changed |= current.insert(channel.clone());
            }
            changed
        });
    }

    fn unsubscribe(&self, channels: &[String]) {
        self.update_channels(|current| {
            let mut changed = false;
            for channel in channels {
                changed |= current.remove(channel);
            }
            changed
        });
    }

    async fn history(&self, channel: &str, options: &HistoryOptions) -> Result<Vec<Value>> {
        let url = self.inner.endpoint(&[
            "v2",
            "history",
            "sub-key",
            self.inner.credentials.subscribe_key.as_str(),
            "channel",
            channel,
        ])?;

        let mut query = Vec::new();
        if let Some(count) = options.count {
            query.push(("count", count.to_string()));
        }
        // A zero bound means "unbounded" and is left off the wire.
        if let Some(start) = options.start.filter(|tt| *tt > 0) {
            query.push(("start", start.to_string()));
        }
        if let Some(end) = options.end.filter(|tt| *tt > 0) {
            query.push(("end", end.to_string()));
        }
        if let Some(reverse) = options.reverse {
            query.push(("reverse", reverse.to_string()));
        }

        debug!(channel, ?options, "history request");
        let response: Vec<Value> = self
            .inner
            .send_json(self.inner.http.get(url).query(&query))
            .await?;

        match response.into_iter().next() {
            Some(Value::Array(entries)) => Ok(entries),
            other => Err(LogsError::ProtocolError(format!(
                "history response missing entries: {:?}",
                other
            ))),
        }
    }

    async fn time(&self) -> Result<Timetoken> {
        let url = self.inner.endpoint(&["time", "0"])?;
        let response: Vec<Value> = self.inner.send_json(self.inner.http.get(url)).await?;

        response
            .first()
            .and_then(parse_timetoken)
            .ok_or_else(|| {
                LogsError::ProtocolError(format!("invalid time response: {:?}", response))
            })
    }

    async fn publish(&self, channel: &str, message: &Value) -> Result<PublishResponse> {
        let body = serde_json::to_string(message).map_err(|e| {
            LogsError::SerializationError(format!("Failed to serialize message: {}", e))
        })?;

        let url = self.inner.endpoint(&[
            "publish",
            self.inner.credentials.publish_key.as_str(),
            self.inner.credentials.subscribe_key.as_str(),
            "0",
            channel,
            "0",
            body.as_str(),
        ])?;

        debug!(channel, "publish request");
        let response: Vec<Value> = self.inner.send_json(self.inner.http.get(url)).await?;

        if response.first().and_then(Value::as_i64) != Some(1) {
            let message = response
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or("publish rejected")
                .to_string();
            return Err(LogsError::Provider {
                status: 200,
                message,
            });
        }

        let timetoken = response
            .get(2)
            .and_then(parse_timetoken)
            .ok_or_else(|| {
                LogsError::ProtocolError(format!("invalid publish response: {:?}", response))
            })?;

        Ok(PublishResponse { timetoken })
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SubscribeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                LogsError::ConfigValidationError(format!("Invalid base URL: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request with the common query parameters and decode a JSON body
    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .query(&[("uuid", self.uuid.as_str()), ("pnsdk", PNSDK)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LogsError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| {
            LogsError::DeserializationError(format!("Failed to decode provider response: {}", e))
        })
    }

    async fn subscribe_once(&self, channels: &[String], cursor: Cursor) -> Result<SubscribeBatch> {
        let joined = channels.join(",");
        let url = self.endpoint(&[
            "v2",
            "subscribe",
            self.credentials.subscribe_key.as_str(),
            joined.as_str(),
            "0",
        ])?;

        let mut query = vec![("tt", cursor.timetoken.to_string())];
        if let Some(region) = cursor.region {
            query.push(("tr", region.to_string()));
        }

        let envelope: SubscribeEnvelope = self
            .send_json(self.subscribe_http.get(url).query(&query))
            .await?;
        envelope.into_batch()
    }

    fn cursor(&self) -> Cursor {
        self.lock_state().cursor
    }

    fn set_cursor(&self, cursor: Cursor) {
        self.lock_state().cursor = cursor;
    }
}

async fn run_subscribe_loop(inner: Arc<Inner>, channels: Vec<String>) {
    let mut connected = false;
    let mut failing = false;

    loop {
        let cursor = inner.cursor();
        debug!(timetoken = cursor.timetoken, "subscribe poll");

        match inner.subscribe_once(&channels, cursor).await {
            Ok(batch) => {
                if !connected {
                    connected = true;
                    inner.listeners.announce_status(&ProviderStatus::new(
                        StatusCategory::Connected,
                        channels.clone(),
                    ));
                } else if failing {
                    inner.listeners.announce_status(&ProviderStatus::new(
                        StatusCategory::Reconnected,
                        channels.clone(),
                    ));
                }
                failing = false;

                // The initial handshake only yields a cursor.
                if cursor.timetoken != 0 {
                    for message in &batch.messages {
                        inner.listeners.announce_message(message);
                    }
                }
                inner.set_cursor(batch.cursor);
            }
            Err(LogsError::Provider { status, message }) if status < 500 => {
                let category = if status == 403 {
                    StatusCategory::AccessDenied
                } else {
                    StatusCategory::BadRequest
                };
                warn!(status, %message, "subscribe rejected by provider, stopping");
                inner
                    .listeners
                    .announce_status(&ProviderStatus::new(category, channels.clone()));
                return;
            }
            Err(e) => {
                warn!(error = %e, "subscribe request failed");
                failing = true;
                inner.listeners.announce_status(&ProviderStatus::new(
                    StatusCategory::NetworkIssues,
                    channels.clone(),
                ));
                tokio::time::sleep(inner.reconnect_delay).await;
            }
        }
    }
}

struct SubscribeBatch {
    cursor: Cursor,
    messages: Vec<ProviderMessage>,
}

#[derive(Debug, Deserialize)]
struct WireCursor {
    t: String,
    #[serde(default)]
    r: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    c: String,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    p: Option<WireCursor>,
}

#[derive(Debug, Deserialize)]
struct SubscribeEnvelope {
    t: WireCursor,
    #[serde(default)]
    m: Vec<WireMessage>,
}

impl SubscribeEnvelope {
    fn into_batch(self) -> Result<SubscribeBatch> {
        let timetoken: Timetoken = self.t.t.parse().map_err(|_| {
            LogsError::ProtocolError(format!("invalid subscribe timetoken: {}", self.t.t))
        })?;

        let messages = self
            .m
            .into_iter()
            .map(|m| ProviderMessage {
                timetoken: m
                    .p
                    .and_then(|p| p.t.parse().ok())
                    .unwrap_or(timetoken),
                channel: m.c,
                message: m.d,
            })
            .collect();

        Ok(SubscribeBatch {
            cursor: Cursor {
                timetoken,
                region: self.t.r,
            },
            messages,
        })
    }
}

/// Builds [`PubNubClient`]s sharing one base configuration
pub struct PubNubFactory {
    config: ClientConfig,
}

impl PubNubFactory {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl ProviderFactory for PubNubFactory {
    fn create(&self, credentials: &Credentials) -> Result<Arc<dyn ProviderClient>> {
        let mut config = self.config.clone();
        config.credentials = credentials.clone();
        Ok(Arc::new(PubNubClient::new(&config)?))
    }
}
