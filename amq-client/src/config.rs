//! Runtime client configuration
//!
//! Built from the resolved `TomlConfig`: stream and command urls plus the deadlines
//! used by the guard, the scrub grace delay and the heartbeat watchdog.

use std::time::Duration;

use amq_common::codec::wanted_info_query;
use amq_common::config::TomlConfig;
use amq_common::protocol::Capability;
use reqwest::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub remove: Duration,
    pub move_item: Duration,
    pub progress: Duration,
    pub scrub_grace: Duration,
    /// `None` disables the watchdog
    pub heartbeat: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&amq_common::config::TimeoutConfig::default())
    }
}

impl From<&amq_common::config::TimeoutConfig> for Timeouts {
    fn from(cfg: &amq_common::config::TimeoutConfig) -> Self {
        Self {
            remove: Duration::from_millis(cfg.remove_ms),
            move_item: Duration::from_millis(cfg.move_ms),
            progress: Duration::from_millis(cfg.progress_ms),
            scrub_grace: Duration::from_millis(cfg.scrub_grace_ms),
            heartbeat: (cfg.heartbeat_ms > 0).then(|| Duration::from_millis(cfg.heartbeat_ms)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub timeouts: Timeouts,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&TomlConfig::default())
    }
}

impl From<&TomlConfig> for ClientConfig {
    fn from(toml: &TomlConfig) -> Self {
        Self {
            host: toml.server.host.clone(),
            port: toml.server.port,
            secure: toml.server.secure,
            timeouts: Timeouts::from(&toml.timeouts),
        }
    }
}

impl ClientConfig {
    /// `http(s)://host:port`
    pub fn http_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// `ws(s)://host:port`
    pub fn ws_base(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn node_stream_url(&self, source_name: &str, wanted: &[Capability]) -> Result<String> {
        build_url(
            &self.ws_base(),
            &["streams", "node", source_name],
            Some(wanted),
        )
    }

    pub fn brain_stream_url(&self, wanted: &[Capability]) -> Result<String> {
        build_url(&self.ws_base(), &["streams", "brain"], Some(wanted))
    }

    pub fn session_stream_url(&self, wanted: &[Capability]) -> Result<String> {
        build_url(&self.ws_base(), &["streams", "session"], Some(wanted))
    }

    pub fn node_command_url(&self, source_name: &str) -> Result<String> {
        build_url(&self.http_base(), &["commands", "node", source_name], None)
    }
}

/// Join path segments onto `base`, percent-encoding each one
pub(crate) fn build_url(base: &str, segments: &[&str], wanted: Option<&[Capability]>) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::invalid_input(format!("invalid server address '{base}': {e}")))?;

    url.path_segments_mut()
        .map_err(|_| Error::invalid_input(format!("server address '{base}' cannot take a path")))?
        .pop_if_empty()
        .extend(segments);

    if let Some(wanted) = wanted {
        url.set_query(Some(&format!("wanted_info={}", wanted_info_query(wanted))));
    }

    Ok(url.to_string())
}
