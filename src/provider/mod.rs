// Provider module - Pub/sub service client contract and implementations

mod pool;
pub mod pubnub;

pub use pool::{ProviderFactory, ProviderPool};
pub use pubnub::{PubNubClient, PubNubFactory};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Provider server time, in 100ns units since the epoch
pub type Timetoken = u64;

/// A message delivered on a subscribed channel
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMessage {
    pub channel: String,
    pub message: Value,
    pub timetoken: Timetoken,
}

/// Provider status categories reported to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    Connected,
    Reconnected,
    Disconnected,
    NetworkIssues,
    AccessDenied,
    BadRequest,
}

impl StatusCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCategory::Connected => "PNConnectedCategory",
            StatusCategory::Reconnected => "PNReconnectedCategory",
            StatusCategory::Disconnected => "PNDisconnectedCategory",
            StatusCategory::NetworkIssues => "PNNetworkIssuesCategory",
            StatusCategory::AccessDenied => "PNAccessDeniedCategory",
            StatusCategory::BadRequest => "PNBadRequestCategory",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status report from the provider's subscribe loop
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStatus {
    pub category: StatusCategory,
    /// Channels affected by the status change
    pub channels: Vec<String>,
}

impl ProviderStatus {
    pub fn new(category: StatusCategory, channels: Vec<String>) -> Self {
        Self { category, channels }
    }
}

/// Receiver of subscribe-loop output
///
/// Callbacks run on the provider's delivery task and must not block.
pub trait Listener: Send + Sync {
    fn message(&self, message: &ProviderMessage);
    fn status(&self, status: &ProviderStatus);
}

/// Handle returned by [`ProviderClient::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Options for a history query, passed to the provider as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryOptions {
    /// Maximum number of entries to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Return entries older than this timetoken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Timetoken>,
    /// Return entries newer than or equal to this timetoken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Timetoken>,
    /// Traverse from oldest to newest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
}

/// Entry count used for history since the last clear when the caller sets none
pub const SINCE_CLEAR_DEFAULT_COUNT: u32 = 200;

impl HistoryOptions {
    pub fn with_count(count: u32) -> Self {
        Self {
            count: Some(count),
            ..Self::default()
        }
    }

    /// Bound these options by the last clear time.
    ///
    /// `count` falls back to [`SINCE_CLEAR_DEFAULT_COUNT`]; `end` is always
    /// replaced with `clear_time`, whatever the caller supplied.
    pub fn since_clear(self, clear_time: Timetoken) -> Self {
        Self {
            count: self.count.or(Some(SINCE_CLEAR_DEFAULT_COUNT)),
            end: Some(clear_time),
            ..self
        }
    }
}

/// Read a timetoken from a JSON number or numeric string
pub fn parse_timetoken(value: &Value) -> Option<Timetoken> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Response to a successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishResponse {
    pub timetoken: Timetoken,
}

/// Client for a hosted pub/sub provider
///
/// Implementations own their connection and subscribe loop; listeners see
/// every message for every channel the instance is subscribed to.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);

    /// Add channels to the live subscription
    fn subscribe(&self, channels: &[String]);

    /// Remove channels from the live subscription
    fn unsubscribe(&self, channels: &[String]);

    /// Fetch stored messages for a channel, returning the message bodies only
    async fn history(&self, channel: &str, options: &HistoryOptions) -> Result<Vec<Value>>;

    /// Current provider server time
    async fn time(&self) -> Result<Timetoken>;

    async fn publish(&self, channel: &str, message: &Value) -> Result<PublishResponse>;
}

/// Listener registry shared by provider implementations
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn Listener>)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) {
        self.lock().retain(|(existing, _)| *existing != id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn announce_message(&self, message: &ProviderMessage) {
        for listener in self.snapshot() {
            listener.message(message);
        }
    }

    pub fn announce_status(&self, status: &ProviderStatus) {
        for listener in self.snapshot() {
            listener.status(status);
        }
    }

    // Callbacks run outside the lock so listeners may unregister themselves.
    fn snapshot(&self) -> Vec<Arc<dyn Listener>> {
        self.lock().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Arc<dyn Listener>)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
