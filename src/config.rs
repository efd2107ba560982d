//! # Configuration Management
//!
//! Loads the relay's configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platform convention)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_RELAY__STRATEGY`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys use a double underscore separator because several field names
//! (`cooldown_ms`, `window_size`, ...) contain single underscores themselves.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Smallest accepted `relay.max_frame_bytes`.
const MIN_FRAME_BYTES: usize = 1024;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub cyclic: CyclicConfig,
    pub energy: EnergyConfig,
}

/// Where the HTTP/WebSocket server listens.
///
/// ## Fields:
/// - `host`: address to bind (`0.0.0.0` accepts connections from anywhere)
/// - `port`: first port to try
/// - `port_fallback_attempts`: how many following ports to try when `port`
///   is already taken
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub port_fallback_attempts: u16,
}

/// Which trigger policy gates broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fixed-length record/playback cycling
    Cyclic,
    /// Silence-after-activity detection
    EnergyGated,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Cyclic => "cyclic",
            TriggerKind::EnergyGated => "energy_gated",
        }
    }
}

/// Relay-wide behaviour independent of the trigger policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub strategy: TriggerKind,

    /// Minimum time between two broadcast fires
    pub cooldown_ms: u64,

    /// Upper bound on a single recipient's delivery
    pub send_timeout_ms: u64,

    /// How often the server pings each connection
    pub heartbeat_interval_secs: u64,

    /// Silence after which a connection is considered dead
    pub client_timeout_secs: u64,

    /// Largest inbound WebSocket frame accepted, in bytes
    pub max_frame_bytes: usize,
}

/// Cyclic strategy phase lengths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyclicConfig {
    pub accumulate_ms: u64,
    pub hold_ms: u64,
}

/// Energy-gated strategy tuning.
///
/// ## Fields:
/// - `window_size`: number of volume samples averaged (cold start = this many chunks)
/// - `threshold`: mean volume strictly above this counts as activity
/// - `silence_ms`: how long the mean must stay at or below threshold before firing
/// - `max_stored_chunks`: accumulator capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyConfig {
    pub window_size: usize,
    pub threshold: f32,
    pub silence_ms: u64,
    pub max_stored_chunks: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                port_fallback_attempts: 3,
            },
            relay: RelayConfig {
                strategy: TriggerKind::Cyclic,
                cooldown_ms: 5000,
                send_timeout_ms: 2000,
                heartbeat_interval_secs: 30,
                client_timeout_secs: 60,
                max_frame_bytes: 1024 * 1024,
            },
            cyclic: CyclicConfig {
                accumulate_ms: 5000,
                hold_ms: 5000,
            },
            energy: EnergyConfig {
                window_size: 10,
                threshold: 0.1,
                silence_ms: 1500,
                max_stored_chunks: 50,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_RELAY__STRATEGY=energy_gated`: switch trigger policy
    /// - `APP_CYCLIC__ACCUMULATE_MS=3000`: shorten the record phase
    /// - `HOST=0.0.0.0`, `PORT=3000`: deployment platform overrides
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject values that would make the relay misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.relay.send_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Send timeout must be greater than 0"));
        }

        if self.relay.heartbeat_interval_secs == 0
            || self.relay.client_timeout_secs <= self.relay.heartbeat_interval_secs
        {
            return Err(anyhow::anyhow!(
                "Client timeout must be greater than a non-zero heartbeat interval"
            ));
        }

        if self.relay.max_frame_bytes < MIN_FRAME_BYTES {
            return Err(anyhow::anyhow!(
                "Max frame size must be at least {} bytes",
                MIN_FRAME_BYTES
            ));
        }

        if self.cyclic.accumulate_ms == 0 || self.cyclic.hold_ms == 0 {
            return Err(anyhow::anyhow!("Cyclic phase durations must be greater than 0"));
        }

        if self.energy.window_size == 0 {
            return Err(anyhow::anyhow!("Energy window size must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.energy.threshold) {
            return Err(anyhow::anyhow!("Energy threshold must be within [0, 1]"));
        }

        if self.energy.silence_ms == 0 {
            return Err(anyhow::anyhow!("Silence duration must be greater than 0"));
        }

        if self.energy.max_stored_chunks == 0 {
            return Err(anyhow::anyhow!("Max stored chunks must be greater than 0"));
        }

        Ok(())
    }
}

impl RelayConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl CyclicConfig {
    pub fn accumulate(&self) -> Duration {
        Duration::from_millis(self.accumulate_ms)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

impl EnergyConfig {
    pub fn silence(&self) -> Duration {
        Duration::from_millis(self.silence_ms)
    }
}
