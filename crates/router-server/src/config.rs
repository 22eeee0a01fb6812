//! Configuration for the router server.
//!
//! Two sources, merged in `Config::from_cli`:
//! - CLI flags (listen addresses, limits, logging).
//! - An optional JSON channel-settings file mapping channel type names to
//!   per-type intervals, e.g.
//!
//! ```json
//! {
//!     "GLOBAL":   { "tick_interval_ms": 10, "default_fan_out_interval_ms": 20 },
//!     "SUBWORLD": { "tick_interval_ms": 50, "default_fan_out_interval_ms": 100 }
//! }
//! ```
//!
//! The `GLOBAL` entry doubles as the fallback for types the file does not
//! mention.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use router_core::ChannelType;

/// Command-line surface of the server binary.
#[derive(Debug, Parser)]
#[command(name = "router-server")]
#[command(about = "Real-time channel router")]
pub struct Cli {
    /// Listen address for game-server (authoritative) peers
    #[arg(long, default_value = "127.0.0.1:11288")]
    pub server_addr: String,

    /// Listen address for client peers
    #[arg(long, default_value = "127.0.0.1:12108")]
    pub client_addr: String,

    /// Path to the JSON channel settings file
    #[arg(long)]
    pub channel_settings: Option<PathBuf>,

    /// Log filter, e.g. "info" or "router_server=debug"
    #[arg(long)]
    pub log_level: Option<String>,

    /// File path to store the log (stderr when absent)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Run in development mode (verbose logging defaults)
    #[arg(long)]
    pub dev: bool,

    /// Maximum number of simultaneously connected peers
    #[arg(long, default_value_t = 1024)]
    pub max_connections: usize,
}

/// Per-channel-type settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelTypeSettings {
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_fan_out_ms")]
    pub default_fan_out_interval_ms: u32,
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

fn default_tick_ms() -> u64 {
    10
}

fn default_fan_out_ms() -> u32 {
    20
}

fn default_inbox_capacity() -> usize {
    1024
}

impl Default for ChannelTypeSettings {
    fn default() -> Self {
        ChannelTypeSettings {
            tick_interval_ms: default_tick_ms(),
            default_fan_out_interval_ms: default_fan_out_ms(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

impl ChannelTypeSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn default_fan_out_interval(&self) -> Duration {
        Duration::from_millis(self.default_fan_out_interval_ms as u64)
    }
}

/// Settings for every channel type, with the GLOBAL entry as fallback.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    entries: HashMap<ChannelType, ChannelTypeSettings>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(ChannelType::Global, ChannelTypeSettings::default());
        ChannelSettings { entries }
    }
}

impl ChannelSettings {
    /// Build from explicit per-type entries (tests, embedding).
    pub fn from_entries(
        entries: impl IntoIterator<Item = (ChannelType, ChannelTypeSettings)>,
    ) -> ChannelSettings {
        let mut settings = ChannelSettings::default();
        settings.entries.extend(entries);
        settings
    }

    /// Settings for `t`, falling back to the GLOBAL entry.
    pub fn get(&self, t: ChannelType) -> &ChannelTypeSettings {
        self.entries
            .get(&t)
            .or_else(|| self.entries.get(&ChannelType::Global))
            .expect("GLOBAL settings entry always present")
    }

    /// Parse the JSON settings file format.
    pub fn from_json(json: &str) -> anyhow::Result<ChannelSettings> {
        let raw: HashMap<String, ChannelTypeSettings> =
            serde_json::from_str(json).context("failed to parse channel settings")?;
        let mut settings = ChannelSettings::default();
        for (name, entry) in raw {
            let channel_type = ChannelType::from_name(&name)
                .with_context(|| format!("unknown channel type in settings: {name:?}"))?;
            settings.entries.insert(channel_type, entry);
        }
        Ok(settings)
    }
}

/// Fully-resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub client_addr: String,
    pub max_connections: usize,
    pub dev: bool,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub channel_settings: ChannelSettings,
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Config> {
        let channel_settings = match &cli.channel_settings {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read channel settings {path:?}"))?;
                ChannelSettings::from_json(&json)?
            }
            None => ChannelSettings::default(),
        };

        Ok(Config {
            server_addr: cli.server_addr,
            client_addr: cli.client_addr,
            max_connections: cli.max_connections,
            dev: cli.dev,
            log_level: cli.log_level,
            log_file: cli.log_file,
            channel_settings,
        })
    }
}
