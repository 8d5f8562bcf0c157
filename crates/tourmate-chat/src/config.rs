use std::time::Duration;

use anyhow::{Context, bail};

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_REALTIME_URL: &str = "ws://127.0.0.1:3000/realtime";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Where a client finds the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    /// Plain `ws://` only; the socket client is built without TLS.
    pub realtime_url: String,
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Read `TOURMATE_API_URL`, `TOURMATE_REALTIME_URL` and
    /// `TOURMATE_RECONNECT_DELAY_MS`, falling back to a local server.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let reconnect_delay = match lookup("TOURMATE_RECONNECT_DELAY_MS") {
            Some(ms) => Duration::from_millis(
                ms.parse()
                    .with_context(|| format!("TOURMATE_RECONNECT_DELAY_MS is not a number: {}", ms))?,
            ),
            None => defaults.reconnect_delay,
        };

        let realtime_url = lookup("TOURMATE_REALTIME_URL").unwrap_or(defaults.realtime_url);
        if !realtime_url.starts_with("ws://") {
            bail!("TOURMATE_REALTIME_URL must be a ws:// URL: {}", realtime_url);
        }

        Ok(Self {
            api_url: lookup("TOURMATE_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            realtime_url,
            reconnect_delay,
        })
    }
}
