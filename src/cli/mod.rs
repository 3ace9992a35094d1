// CLI module - User-facing command-line interface

mod output;

use crate::config::{ClientConfig, Credentials};
use crate::device::Device;
use crate::error::Result;
use crate::logs::{LogClient, LogEvent, LogLine, LogSubscription};
use crate::provider::{HistoryOptions, Timetoken};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use output::print_error;

/// Default configuration file, looked up in the working directory
const DEFAULT_CONFIG_PATH: &str = "device-logs.toml";

/// device-logs - Stream and manage remote device logs
#[derive(Parser)]
#[command(name = "device-logs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (.toml or .json)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DeviceArgs {
    /// Device UUID
    uuid: String,

    /// Logs channel overriding the UUID
    #[arg(long)]
    logs_channel: Option<String>,
}

impl DeviceArgs {
    fn device(&self) -> Device {
        let device = Device::new(self.uuid.clone());
        match &self.logs_channel {
            Some(channel) => device.with_logs_channel(channel.clone()),
            None => device,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live logs until interrupted
    Tail {
        #[command(flatten)]
        device: DeviceArgs,

        /// Print history since the last clear before streaming
        #[arg(long)]
        since_clear: bool,
    },

    /// Print stored logs
    History {
        #[command(flatten)]
        device: DeviceArgs,

        /// Maximum number of entries to fetch
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Only entries older than this timetoken
        #[arg(long)]
        start: Option<Timetoken>,

        /// Only entries newer than this timetoken
        #[arg(long)]
        end: Option<Timetoken>,

        /// Only entries after the most recent clear
        #[arg(long)]
        since_clear: bool,
    },

    /// Mark the device's log history as cleared
    Clear {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Show when the device's logs were last cleared
    LastClear {
        #[command(flatten)]
        device: DeviceArgs,
    },
}

impl Cli {
    /// Run the CLI application
    pub async fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute().await
    }

    /// Execute the parsed command
    async fn execute(&self) -> Result<()> {
        let config = ClientConfig::from_file(&self.config)?;
        let credentials = config.credentials.clone();
        let client = LogClient::pubnub(config);

        match &self.command {
            Commands::Tail {
                device,
                since_clear,
            } => {
                let (mut subscription, backlog) =
                    open_tail(&client, &credentials, &device.device(), *since_clear).await?;
                if *since_clear {
                    output::print_lines(&backlog);
                }

                loop {
                    tokio::select! {
                        event = subscription.next() => match event {
                            Some(LogEvent::Line(line)) => output::print_line(&line),
                            Some(LogEvent::Clear) => output::print_clear_marker(),
                            Some(LogEvent::Error(category)) => output::print_warning(&category),
                            None => break,
                        },
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
                subscription.unsubscribe();
                Ok(())
            }

            Commands::History {
                device,
                count,
                start,
                end,
                since_clear,
            } => {
                let device = device.device();
                let options = build_history_options(*count, *start, *end);
                let lines = if *since_clear {
                    client
                        .history_since_last_clear(&credentials, &device, &options)
                        .await?
                } else {
                    client.history(&credentials, &device, &options).await?
                };
                output::print_lines(&lines);
                Ok(())
            }

            Commands::Clear { device } => {
                let response = client.clear(&credentials, &device.device()).await?;
                output::print_cleared(response.timetoken);
                Ok(())
            }

            Commands::LastClear { device } => {
                let timetoken = client
                    .get_last_clear_time(&credentials, &device.device())
                    .await?;
                output::print_last_clear(timetoken);
                Ok(())
            }
        }
    }
}

/// Subscribe to a device's logs, then read the backlog since the last clear
///
/// Lines published while the backlog is read are queued on the returned
/// subscription.
pub async fn open_tail(
    client: &LogClient,
    credentials: &Credentials,
    device: &Device,
    since_clear: bool,
) -> Result<(LogSubscription, Vec<LogLine>)> {
    let subscription = client.subscribe(credentials, device)?;
    let backlog = if since_clear {
        client
            .history_since_last_clear(credentials, device, &HistoryOptions::default())
            .await?
    } else {
        Vec::new()
    };
    Ok((subscription, backlog))
}

fn build_history_options(
    count: Option<u32>,
    start: Option<Timetoken>,
    end: Option<Timetoken>,
) -> HistoryOptions {
    HistoryOptions {
        count,
        start,
        end,
        reverse: None,
    }
}
