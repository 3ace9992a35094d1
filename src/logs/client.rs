use crate::config::{ClientConfig, Credentials};
use crate::device::{ChannelPair, Device};
use crate::error::Result;
use crate::logs::extract::{extract_messages, LogLine};
use crate::logs::subscription::LogSubscription;
use crate::provider::{
    parse_timetoken, HistoryOptions, ProviderFactory, ProviderPool, PubNubFactory,
    PublishResponse, Timetoken,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Device log access over a pub/sub provider
///
/// Provider clients are created per credential pair on first use and reused
/// afterwards. Provider errors are returned unchanged.
pub struct LogClient {
    pool: ProviderPool,
}

impl LogClient {
    /// Create a client that builds providers with `factory`
    pub fn new<F: ProviderFactory + 'static>(factory: F) -> Self {
        Self {
            pool: ProviderPool::new(factory),
        }
    }

    /// Create a client talking to PubNub with the given base configuration
    pub fn pubnub(config: ClientConfig) -> Self {
        Self::new(PubNubFactory::new(config))
    }

    /// Subscribe to a device's live logs
    ///
    /// # Returns
    /// * `Ok(LogSubscription)` - Handle yielding `Line`, `Clear` and `Error` events
    /// * `Err(LogsError)` - No provider client could be created for `credentials`
    pub fn subscribe(&self, credentials: &Credentials, device: &Device) -> Result<LogSubscription> {
        let channels = ChannelPair::for_device(device);
        let provider = self.pool.get_instance(credentials)?;
        Ok(LogSubscription::open(provider, channels))
    }

    /// Fetch stored log lines for a device
    ///
    /// `options` go to the provider untouched. Entries holding several lines
    /// are flattened in order.
    pub async fn history(
        &self,
        credentials: &Credentials,
        device: &Device,
        options: &HistoryOptions,
    ) -> Result<Vec<LogLine>> {
        let provider = self.pool.get_instance(credentials)?;
        let channel = ChannelPair::for_device(device).log_channel;

        let entries = provider.history(&channel, options).await?;
        debug!(%channel, entries = entries.len(), "fetched log history");

        Ok(entries.iter().flat_map(extract_messages).collect())
    }

    /// Fetch stored log lines published after the most recent clear
    ///
    /// `count` defaults to 200 when unset. `end` is always the last clear
    /// time, replacing any caller value.
    pub async fn history_since_last_clear(
        &self,
        credentials: &Credentials,
        device: &Device,
        options: &HistoryOptions,
    ) -> Result<Vec<LogLine>> {
        let clear_time = self.get_last_clear_time(credentials, device).await?;
        let options = options.clone().since_clear(clear_time);
        self.history(credentials, device, &options).await
    }

    /// Mark the device's log history as cleared at the current server time
    pub async fn clear(&self, credentials: &Credentials, device: &Device) -> Result<PublishResponse> {
        let provider = self.pool.get_instance(credentials)?;
        let channel = ChannelPair::for_device(device).clear_channel;

        let timetoken = provider.time().await?;
        debug!(%channel, timetoken, "publishing clear marker");
        provider.publish(&channel, &Value::from(timetoken)).await
    }

    /// Timetoken of the most recent clear, or `0` if the logs were never cleared
    pub async fn get_last_clear_time(
        &self,
        credentials: &Credentials,
        device: &Device,
    ) -> Result<Timetoken> {
        let provider = self.pool.get_instance(credentials)?;
        let channel = ChannelPair::for_device(device).clear_channel;

        let entries = provider
            .history(&channel, &HistoryOptions::with_count(1))
            .await?;

        let Some(entry) = entries.first() else {
            return Ok(0);
        };

        Ok(parse_timetoken(entry).unwrap_or_else(|| {
            warn!(%channel, %entry, "unreadable clear marker, treating as never cleared");
            0
        }))
    }
}
