//! Layered settings: built-in defaults, an optional TOML file, then
//! `BRIDGE__*` environment variables.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::ports::CaptureOptions;
use crate::application::signaling::SourceBinding;
use crate::domain::value_objects::SourceLocator;

const DEFAULT_CONFIG_FILE: &str = "bridge.toml";
const ENV_PREFIX: &str = "BRIDGE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub source: SourceSettings,
    pub sessions: SessionSettings,
    pub webrtc: WebRtcSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// File path or RTSP URL
    pub locator: String,
    pub frame_rate: u32,
    pub capture: CaptureOptions,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            locator: "mov_hts-samp009.mp4".to_string(),
            frame_rate: 30,
            capture: CaptureOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// 0 admits any number of concurrent sessions
    pub max_sessions: usize,
}

impl SessionSettings {
    /// Admission limit for the registry, `None` when unlimited
    pub fn limit(&self) -> Option<usize> {
        (self.max_sessions > 0).then_some(self.max_sessions)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcSettings {
    pub ice_servers: Vec<String>,
    pub disconnected_timeout_secs: u64,
    pub failed_timeout_secs: u64,
    pub keepalive_interval_ms: u64,
}

impl Default for WebRtcSettings {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            disconnected_timeout_secs: 5,
            failed_timeout_secs: 10,
            keepalive_interval_ms: 200,
        }
    }
}

impl WebRtcSettings {
    pub fn disconnected_timeout(&self) -> Duration {
        Duration::from_secs(self.disconnected_timeout_secs)
    }

    pub fn failed_timeout(&self) -> Duration {
        Duration::from_secs(self.failed_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}

impl Settings {
    /// Load settings from `BRIDGE_CONFIG` (or `bridge.toml`) and the
    /// environment, then validate them.
    pub fn load() -> Result<Self> {
        let path = std::env::var("BRIDGE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings = Self::load_from(&path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load_from(path: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("webrtc.ice_servers")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration ({})", path))?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=120).contains(&self.source.frame_rate) {
            bail!(
                "source.frame_rate must be between 1 and 120, got {}",
                self.source.frame_rate
            );
        }
        SourceLocator::parse(self.source.locator.as_str()).context("source.locator is invalid")?;
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.server.host, self.server.port))
    }

    pub fn source_binding(&self) -> Result<SourceBinding> {
        Ok(SourceBinding {
            locator: SourceLocator::parse(self.source.locator.as_str())?,
            options: self.source.capture.clone(),
            frame_rate: self.source.frame_rate,
        })
    }
}
