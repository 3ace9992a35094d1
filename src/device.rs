// Device identity and channel naming

use serde::{Deserialize, Serialize};

/// A remote device whose logs are published to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device UUID
    pub uuid: String,

    /// Explicit logs channel, overriding the UUID when set
    #[serde(default)]
    pub logs_channel: Option<String>,
}

impl Device {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            logs_channel: None,
        }
    }

    pub fn with_logs_channel(mut self, channel: impl Into<String>) -> Self {
        self.logs_channel = Some(channel.into());
        self
    }

    fn channel_base(&self) -> &str {
        match self.logs_channel.as_deref() {
            Some(channel) if !channel.is_empty() => channel,
            _ => &self.uuid,
        }
    }
}

/// The two channels carrying a device's logs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelPair {
    /// Channel carrying log lines
    pub log_channel: String,
    /// Channel carrying clear markers
    pub clear_channel: String,
}

impl ChannelPair {
    /// Derive the channel pair for a device
    pub fn for_device(device: &Device) -> Self {
        let log_channel = format!("device-{}-logs", device.channel_base());
        let clear_channel = format!("{}-clear", log_channel);
        Self {
            log_channel,
            clear_channel,
        }
    }

    /// Both channels, log channel first
    pub fn to_vec(&self) -> Vec<String> {
        vec![self.log_channel.clone(), self.clear_channel.clone()]
    }
}
