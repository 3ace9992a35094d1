// Logs module - Device log streaming and history

mod client;
mod extract;
mod subscription;

pub use client::LogClient;
pub use extract::{extract_messages, LogLine};
pub use subscription::{LogEvent, LogSubscription, SUBSCRIBE_ERROR_CATEGORY};
