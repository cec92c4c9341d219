// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::cache::sync::Capacities;
use crate::connection::ConnectionSettings;
use crate::transport::build_ws_url;

/// Configuration for the dashboard sync client.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "artery-sync", version, about = "Real-time cache sync for the signal dashboard")]
pub struct SyncConfig {
    /// Backend base URL (http or https).
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "ARTERY_SYNC_URL")]
    pub url: String,

    /// Path of the event-stream WebSocket endpoint.
    #[arg(long, default_value = "/ws", env = "ARTERY_SYNC_WS_PATH")]
    pub ws_path: String,

    /// Bearer token for the REST API and the event stream.
    #[arg(long, env = "ARTERY_SYNC_TOKEN")]
    pub token: Option<String>,

    /// First reconnect delay in milliseconds; doubles per attempt.
    #[arg(long, default_value_t = 1000, env = "ARTERY_SYNC_RECONNECT_BASE_MS")]
    pub reconnect_base_ms: u64,

    /// Reconnect attempts before giving up until a manual reconnect.
    #[arg(long, default_value_t = 5, env = "ARTERY_SYNC_MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: u32,

    /// Timeout for one connect attempt (and for REST requests) in milliseconds.
    #[arg(long, default_value_t = 10000, env = "ARTERY_SYNC_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,

    /// Age in milliseconds after which a cached query is refetched.
    #[arg(long, default_value_t = 30000, env = "ARTERY_SYNC_STALE_MS")]
    pub stale_ms: u64,

    /// Stale-entry refresh interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "ARTERY_SYNC_REFRESH_MS")]
    pub refresh_ms: u64,

    /// Points kept per bandwidth series (0 = unbounded).
    #[arg(long, default_value_t = 300, env = "ARTERY_SYNC_SERIES_CAPACITY")]
    pub series_capacity: usize,

    /// Entries kept in the alert feed.
    #[arg(long, default_value_t = 50, env = "ARTERY_SYNC_ALERT_CAPACITY")]
    pub alert_capacity: usize,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "ARTERY_SYNC_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "ARTERY_SYNC_LOG_LEVEL")]
    pub log_level: String,
}

impl SyncConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            anyhow::bail!("--url must be an http:// or https:// URL, got {:?}", self.url);
        }
        if !self.ws_path.starts_with('/') {
            anyhow::bail!("--ws-path must start with '/'");
        }
        if self.reconnect_base_ms == 0 {
            anyhow::bail!("--reconnect-base-ms must be greater than zero");
        }
        if self.connect_timeout_ms == 0 {
            anyhow::bail!("--connect-timeout-ms must be greater than zero");
        }
        if self.refresh_ms == 0 {
            anyhow::bail!("--refresh-ms must be greater than zero");
        }
        if self.alert_capacity == 0 {
            anyhow::bail!("--alert-capacity must be greater than zero");
        }
        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("--log-format must be json or text, got {other:?}"),
        }
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.stale_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn ws_url(&self) -> String {
        build_ws_url(&self.url, &self.ws_path)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            url: self.ws_url(),
            reconnect_base: self.reconnect_base(),
            max_attempts: self.max_reconnect_attempts,
            connect_timeout: self.connect_timeout(),
        }
    }

    pub fn capacities(&self) -> Capacities {
        Capacities {
            series: (self.series_capacity > 0).then_some(self.series_capacity),
            alerts: self.alert_capacity,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
