//! Configuration loading from `.env` files and the process environment.

use std::{env, path::Path, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use tracing::warn;

use crate::{
    aggregator::DEFAULT_RELAY_TIMEOUT,
    client::DEFAULT_GATEWAY_HOST,
    transport::{RelayEndpoint, TransportConfig},
};

/// Relays queried when `RELAYS` is unset or yields no usable URL.
pub const DEFAULT_RELAYS: [&str; 4] = [
    "wss://nos.lol",
    "wss://relay.damus.io",
    "wss://relay.primal.net",
    "wss://relay.nostr.band",
];

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Relays every query fans out to.
    pub relays: Vec<RelayEndpoint>,
    /// Deadline applied to each relay independently.
    pub relay_timeout: Duration,
    /// Optional Tor SOCKS proxy (host:port).
    pub tor_socks: Option<String>,
    /// Upper bound for a single inbound frame, in bytes.
    pub max_frame_size: usize,
    /// Keep-alive ping interval; `None` disables pings.
    pub ping_interval: Option<Duration>,
    /// Optional `limit` sent with content queries.
    pub content_limit: Option<u32>,
    /// Host used for feed links.
    pub gateway_host: String,
}

impl Default for Settings {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            relays: default_relays(),
            relay_timeout: DEFAULT_RELAY_TIMEOUT,
            tor_socks: transport.tor_socks,
            max_frame_size: transport.max_frame_size,
            ping_interval: transport.ping_interval,
            content_limit: None,
            gateway_host: DEFAULT_GATEWAY_HOST.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the specified `.env` file, if it exists, then
    /// the process environment.
    pub fn from_env(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path).with_context(|| format!("reading env file {path}"))?;
        }
        let defaults = Self::default();

        let relays = match env::var("RELAYS") {
            Ok(s) => relay_list(&s),
            Err(_) => defaults.relays,
        };
        let relay_timeout = env_number::<u64>("RELAY_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.relay_timeout);
        let tor_socks = env::var("TOR_SOCKS").ok().filter(|s| !s.trim().is_empty());
        let max_frame_size = env_number::<usize>("MAX_FRAME_SIZE")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_frame_size);
        let ping_interval = match env_number::<u64>("PING_INTERVAL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.ping_interval,
        };
        let content_limit = env_number::<u32>("CONTENT_LIMIT").filter(|n| *n > 0);
        let gateway_host = env::var("GATEWAY_HOST")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.gateway_host);

        Ok(Self {
            relays,
            relay_timeout,
            tor_socks,
            max_frame_size,
            ping_interval,
            content_limit,
            gateway_host,
        })
    }

    /// Connection settings shared by every relay connection.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            max_frame_size: self.max_frame_size,
            ping_interval: self.ping_interval,
            tor_socks: self.tor_socks.clone(),
        }
    }
}

fn default_relays() -> Vec<RelayEndpoint> {
    DEFAULT_RELAYS
        .iter()
        .filter_map(|url| RelayEndpoint::parse(url).ok())
        .collect()
}

/// Parse a comma-separated relay list, skipping invalid entries.
fn relay_list(input: &str) -> Vec<RelayEndpoint> {
    let relays: Vec<RelayEndpoint> = csv_strings(input)
        .into_iter()
        .filter_map(|url| match RelayEndpoint::parse(&url) {
            Ok(relay) => Some(relay),
            Err(e) => {
                warn!(%url, error = %e, "skipping relay");
                None
            }
        })
        .collect();
    if relays.is_empty() {
        warn!("no usable relays configured, using defaults");
        return default_relays();
    }
    relays
}

fn env_number<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(key, value = raw, "ignoring invalid number");
            None
        }
    }
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    input
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
