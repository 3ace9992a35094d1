// Library exports for device log streaming

pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod logs;
pub mod provider;
