//! warlink configuration
//!
//! Defaults cover a typical LAN party setup; an optional TOML file can
//! override probe/broadcast cadences and the overlay API endpoint.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::{GameVersion, Product};
use crate::{Error, Result};

/// Main warlink configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Game version and product settings
    #[serde(default)]
    pub game: GameConfig,

    /// Ticker cadences and staleness timeouts
    #[serde(default)]
    pub timing: TimingConfig,

    /// Mesh overlay settings
    #[serde(default)]
    pub overlay: OverlayConfig,
}

/// Game version settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Game version to carry in discovery probes (26 = 1.26).
    /// Zero disables probing until a version is set at runtime.
    #[serde(default = "default_game_version")]
    pub version: u32,

    /// Product code ("W3XP" for the expansion, "WAR3" for classic)
    #[serde(default = "default_product")]
    pub product: String,
}

/// Ticker cadences and staleness timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How often to probe peers for games, in seconds
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// How often to re-announce remote games on the LAN, in seconds
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,

    /// How long before an unrefreshed game is dropped, in seconds
    #[serde(default = "default_game_timeout_secs")]
    pub game_timeout_secs: u64,

    /// How often to poll the overlay daemon for peer changes, in seconds
    #[serde(default = "default_overlay_poll_secs")]
    pub overlay_poll_secs: u64,
}

/// Mesh overlay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Base URL of the overlay daemon's local status API
    #[serde(default = "default_local_api_url")]
    pub local_api_url: String,
}

fn default_game_version() -> u32 {
    // TFT 1.26, the common denominator at classic LAN parties.
    26
}

fn default_product() -> String {
    "W3XP".to_string()
}

fn default_probe_interval_secs() -> u64 {
    2
}

fn default_broadcast_interval_secs() -> u64 {
    3
}

fn default_game_timeout_secs() -> u64 {
    10
}

fn default_overlay_poll_secs() -> u64 {
    5
}

fn default_local_api_url() -> String {
    "http://127.0.0.1:41112".to_string()
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            version: default_game_version(),
            product: default_product(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            broadcast_interval_secs: default_broadcast_interval_secs(),
            game_timeout_secs: default_game_timeout_secs(),
            overlay_poll_secs: default_overlay_poll_secs(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            local_api_url: default_local_api_url(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timing.probe_interval_secs == 0 {
            return Err(Error::Config("timing.probe_interval_secs cannot be zero".into()));
        }

        if self.timing.broadcast_interval_secs == 0 {
            return Err(Error::Config("timing.broadcast_interval_secs cannot be zero".into()));
        }

        if self.timing.game_timeout_secs == 0 {
            return Err(Error::Config("timing.game_timeout_secs cannot be zero".into()));
        }

        if self.overlay.local_api_url.is_empty() {
            return Err(Error::Config("overlay.local_api_url cannot be empty".into()));
        }

        Product::parse(&self.game.product)?;

        Ok(())
    }

    /// Game version carried in discovery probes
    pub fn game_version(&self) -> Result<GameVersion> {
        Ok(GameVersion {
            product: Product::parse(&self.game.product)?,
            version: self.game.version,
        })
    }

    /// Probe cadence as a Duration
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.timing.probe_interval_secs)
    }

    /// Broadcast cadence as a Duration
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.timing.broadcast_interval_secs)
    }

    /// Staleness cutoff as a Duration
    pub fn game_timeout(&self) -> Duration {
        Duration::from_secs(self.timing.game_timeout_secs)
    }

    /// Overlay poll cadence as a Duration
    pub fn overlay_poll_interval(&self) -> Duration {
        Duration::from_secs(self.timing.overlay_poll_secs)
    }
}

/// Parse a version string like "1.26" or "26" into the wire version number.
pub fn parse_version(s: &str) -> Result<u32> {
    let s = s.trim();
    let s = s.strip_prefix("1.").unwrap_or(s);

    s.parse::<u32>().map_err(|_| Error::InvalidVersion(s.to_string()))
}

/// Format a wire version number as "1.XX".
pub fn format_version(v: u32) -> String {
    format!("1.{}", v)
}

/// Game versions known to interoperate with the bridge.
pub fn supported_versions() -> &'static [u32] {
    &[26, 27, 28]
}
