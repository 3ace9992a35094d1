// Shared test helpers: an in-memory provider

#![allow(dead_code)]

use async_trait::async_trait;
use device_logs::config::Credentials;
use device_logs::error::{LogsError, Result};
use device_logs::logs::LogClient;
use device_logs::provider::{
    HistoryOptions, Listener, ListenerId, ListenerSet, ProviderClient, ProviderMessage,
    ProviderStatus, PublishResponse, StatusCategory, Timetoken,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Provider that records calls and lets tests push messages to listeners
#[derive(Default)]
pub struct MockProvider {
    listeners: ListenerSet,
    pub subscribe_calls: Mutex<Vec<Vec<String>>>,
    pub unsubscribe_calls: Mutex<Vec<Vec<String>>>,
    pub history_calls: Mutex<Vec<(String, HistoryOptions)>>,
    pub published: Mutex<Vec<(String, Value)>>,
    stored: Mutex<HashMap<String, Vec<Value>>>,
    history_error: Mutex<Option<(u16, String)>>,
    time_calls: Mutex<usize>,
    server_time: Timetoken,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            server_time: 15_000_000_000_000_000,
            ..Self::default()
        })
    }

    pub fn with_server_time(server_time: Timetoken) -> Arc<Self> {
        Arc::new(Self {
            server_time,
            ..Self::default()
        })
    }

    /// Store history entries for a channel
    pub fn set_history(&self, channel: &str, entries: Vec<Value>) {
        self.stored
            .lock()
            .unwrap()
            .insert(channel.to_string(), entries);
    }

    /// Make every history call fail with a provider error
    pub fn fail_history(&self, status: u16, message: &str) {
        *self.history_error.lock().unwrap() = Some((status, message.to_string()));
    }

    /// Push a message to every registered listener
    pub fn deliver(&self, channel: &str, message: Value) {
        self.listeners.announce_message(&ProviderMessage {
            channel: channel.to_string(),
            message,
            timetoken: self.server_time,
        });
    }

    /// Push a status report to every registered listener
    pub fn report(&self, category: StatusCategory) {
        self.listeners
            .announce_status(&ProviderStatus::new(category, Vec::new()));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn time_calls(&self) -> usize {
        *self.time_calls.lock().unwrap()
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn subscribe(&self, channels: &[String]) {
        self.subscribe_calls.lock().unwrap().push(channels.to_vec());
    }

    fn unsubscribe(&self, channels: &[String]) {
        self.unsubscribe_calls
            .lock()
            .unwrap()
            .push(channels.to_vec());
    }

    async fn history(&self, channel: &str, options: &HistoryOptions) -> Result<Vec<Value>> {
        self.history_calls
            .lock()
            .unwrap()
            .push((channel.to_string(), options.clone()));

        if let Some((status, message)) = self.history_error.lock().unwrap().clone() {
            return Err(LogsError::Provider { status, message });
        }

        let mut entries = self
            .stored
            .lock()
            .unwrap()
            .get(channel)
            .cloned()
            .unwrap_or_default();

        // Newest entries win when a count is given, like the real service.
        if let Some(count) = options.count {
            let count = count as usize;
            if entries.len() > count {
                entries = entries.split_off(entries.len() - count);
            }
        }

        Ok(entries)
    }

    async fn time(&self) -> Result<Timetoken> {
        *self.time_calls.lock().unwrap() += 1;
        Ok(self.server_time)
    }

    async fn publish(&self, channel: &str, message: &Value) -> Result<PublishResponse> {
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), message.clone()));
        Ok(PublishResponse {
            timetoken: self.server_time + 1,
        })
    }
}

/// A log client that hands out `provider` for every credential pair
pub fn client_for(provider: &Arc<MockProvider>) -> LogClient {
    let provider = Arc::clone(provider);
    LogClient::new(
        move |_: &Credentials| -> Result<Arc<dyn ProviderClient>> {
            let instance: Arc<dyn ProviderClient> = provider.clone();
            Ok(instance)
        },
    )
}

pub fn test_credentials() -> Credentials {
    Credentials::new("sub-c-test", "pub-c-test")
}
