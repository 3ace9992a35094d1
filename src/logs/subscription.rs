use crate::device::ChannelPair;
use crate::logs::extract::{extract_messages, LogLine};
use crate::provider::{
    Listener, ListenerId, ProviderClient, ProviderMessage, ProviderStatus, StatusCategory,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Status category surfaced to subscribers as an error event
pub const SUBSCRIBE_ERROR_CATEGORY: StatusCategory = StatusCategory::NetworkIssues;

/// An event produced by a live log subscription
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// A log line arrived on the device's log channel
    Line(LogLine),
    /// A clear marker was published for the device
    Clear,
    /// The provider reported a network problem; carries the category name
    Error(String),
}

/// Routes provider output for one channel pair into a subscription's queue
struct ChannelRouter {
    channels: ChannelPair,
    events: mpsc::UnboundedSender<LogEvent>,
}

impl ChannelRouter {
    fn emit(&self, event: LogEvent) {
        // The handle may already be gone; nothing left to deliver to.
        let _ = self.events.send(event);
    }
}

impl Listener for ChannelRouter {
    fn message(&self, message: &ProviderMessage) {
        if message.channel == self.channels.clear_channel {
            self.emit(LogEvent::Clear);
            return;
        }

        if message.channel == self.channels.log_channel {
            for line in extract_messages(&message.message) {
                self.emit(LogEvent::Line(line));
            }
        }
    }

    fn status(&self, status: &ProviderStatus) {
        if status.category == SUBSCRIBE_ERROR_CATEGORY {
            tracing::warn!(
                channel = %self.channels.log_channel,
                category = %status.category,
                "log subscription network issue"
            );
            self.emit(LogEvent::Error(status.category.as_str().to_string()));
        }
    }
}

/// Live subscription to a device's logs
///
/// Events are read with [`LogSubscription::next`]. Call
/// [`LogSubscription::unsubscribe`] (or drop the handle) to release the
/// listener and the provider channels.
pub struct LogSubscription {
    provider: Arc<dyn ProviderClient>,
    channels: ChannelPair,
    listener: ListenerId,
    receiver: mpsc::UnboundedReceiver<LogEvent>,
    released: bool,
}

impl LogSubscription {
    /// Register a listener for `channels` on `provider` and subscribe to both channels
    pub(crate) fn open(provider: Arc<dyn ProviderClient>, channels: ChannelPair) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let router = Arc::new(ChannelRouter {
            channels: channels.clone(),
            events: tx,
        });
        let listener = provider.add_listener(router);
        provider.subscribe(&channels.to_vec());

        tracing::info!(
            log_channel = %channels.log_channel,
            clear_channel = %channels.clear_channel,
            "subscribed to device logs"
        );

        Self {
            provider,
            channels,
            listener,
            receiver: rx,
            released: false,
        }
    }

    /// Receive the next event
    ///
    /// # Returns
    /// * `Some(LogEvent)` - Next event
    /// * `None` - The subscription has been released
    pub async fn next(&mut self) -> Option<LogEvent> {
        if self.released {
            return None;
        }
        self.receiver.recv().await
    }

    /// Receive an event if one is already queued
    pub fn try_next(&mut self) -> Option<LogEvent> {
        if self.released {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Channels this subscription listens on
    pub fn channels(&self) -> &ChannelPair {
        &self.channels
    }

    /// Whether the subscription is still delivering events
    pub fn is_active(&self) -> bool {
        !self.released
    }

    /// Remove the listener and unsubscribe both channels
    ///
    /// Only the first call does anything; queued events are discarded.
    pub fn unsubscribe(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.provider.remove_listener(self.listener);
        self.provider.unsubscribe(&self.channels.to_vec());
        self.receiver.close();

        tracing::info!(
            log_channel = %self.channels.log_channel,
            "unsubscribed from device logs"
        );
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
