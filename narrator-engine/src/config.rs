//! Configuration management for narrator-engine
//!
//! Two layers:
//! 1. **TOML bootstrap**: port, logging, TTS endpoint, headless backend
//!    policy and engine tuning (`[engine]`)
//! 2. **Command-line overrides**: `--port`, `--tts-endpoint`, `--log-level`
//!
//! Every field has a built-in default, so running without a config file is
//! valid.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (and their env fallbacks)
//! 2. TOML configuration file
//! 3. Built-in defaults (code constants)

use crate::error::{Error, Result};
use narrator_common::events::BackendKind;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server port
    pub port: u16,

    /// Address the HTTP server binds to
    pub bind_address: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// TTS service configuration
    pub tts: TtsConfig,

    /// Headless backend policy
    pub headless: HeadlessConfig,

    /// Engine tuning
    pub engine: EngineSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: "127.0.0.1".to_string(),
            logging: LoggingConfig::default(),
            tts: TtsConfig::default(),
            headless: HeadlessConfig::default(),
            engine: EngineSettings::default(),
        }
    }
}

fn default_port() -> u16 {
    5731
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// TTS service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Synthesis endpoint (POST `{ "text": ... }`); None disables synthesis
    pub endpoint: Option<String>,

    /// Request timeout
    pub timeout_ms: u64,

    /// Fetch audio for narrations that arrive without a payload
    pub synthesize_on_miss: bool,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 15_000,
            synthesize_on_miss: true,
        }
    }
}

impl TtsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Headless backend policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    /// Decode context starts in the running state
    pub decode_context_running: bool,

    /// Element playback is rejected until a gesture/unlock
    pub autoplay_requires_gesture: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            decode_context_running: true,
            autoplay_requires_gesture: false,
        }
    }
}

/// Engine tuning parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Extra time the watchdog allows past the expected end
    pub watchdog_tolerance_ms: u64,

    /// Window in which later-deadline re-arms are coalesced
    pub watchdog_coalesce_window_ms: u64,

    /// Speaking rate used for synthetic duration estimates
    pub synthetic_words_per_second: f64,

    /// Floor for synthetic duration estimates
    pub synthetic_min_seconds: f64,

    /// Maximum prefetch cache entries
    pub cache_capacity: usize,

    /// Ambient video start attempts
    pub video_retry_attempts: u32,

    /// First retry delay (doubles per attempt)
    pub video_retry_base_delay_ms: u64,

    /// Minimum remaining duration after resume
    pub resume_epsilon_ms: u64,

    /// Preferred backend order when audio is available
    pub backend_order: Vec<BackendKind>,

    /// Play an unlock sound and retry once after an element failure
    pub unlock_retry: bool,

    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            watchdog_tolerance_ms: 500,
            watchdog_coalesce_window_ms: 1500,
            synthetic_words_per_second: 2.5,
            synthetic_min_seconds: 1.5,
            cache_capacity: 10,
            video_retry_attempts: 3,
            video_retry_base_delay_ms: 200,
            resume_epsilon_ms: 50,
            backend_order: vec![BackendKind::StreamingDecode, BackendKind::BufferedElement],
            unlock_retry: true,
            event_capacity: 256,
        }
    }
}

impl EngineSettings {
    pub fn watchdog_tolerance(&self) -> Duration {
        Duration::from_millis(self.watchdog_tolerance_ms)
    }

    pub fn watchdog_coalesce_window(&self) -> Duration {
        Duration::from_millis(self.watchdog_coalesce_window_ms)
    }

    pub fn video_retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.video_retry_base_delay_ms)
    }

    /// Resume epsilon in seconds
    pub fn resume_epsilon_seconds(&self) -> f64 {
        self.resume_epsilon_ms as f64 / 1000.0
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.synthetic_words_per_second.is_finite() && self.synthetic_words_per_second > 0.0) {
            return Err(Error::Config(format!(
                "synthetic_words_per_second must be positive, got {}",
                self.synthetic_words_per_second
            )));
        }
        if !(self.synthetic_min_seconds.is_finite() && self.synthetic_min_seconds >= 0.0) {
            return Err(Error::Config(format!(
                "synthetic_min_seconds must be non-negative, got {}",
                self.synthetic_min_seconds
            )));
        }
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be at least 1".to_string()));
        }
        if self.video_retry_attempts == 0 {
            return Err(Error::Config(
                "video_retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        if self.backend_order.contains(&BackendKind::Synthetic) {
            return Err(Error::Config(
                "backend_order lists audio backends only; synthetic is always the last resort"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub tts_endpoint: Option<String>,
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from an optional TOML file and apply overrides
    ///
    /// # Errors
    ///
    /// Returns error if the TOML file cannot be read or parsed, or the
    /// resulting engine settings are invalid.
    pub fn load(toml_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match toml_path {
            Some(path) => {
                let config: Config = narrator_common::config::load_toml(path)?;
                info!("Loaded TOML configuration from {:?}", path);
                config
            }
            None => {
                info!("No config file found, using built-in defaults");
                Config::default()
            }
        };

        if let Some(port) = overrides.port {
            config.port = port;
        }
        if let Some(endpoint) = overrides.tts_endpoint {
            config.tts.endpoint = Some(endpoint);
        }
        if let Some(level) = overrides.log_level {
            config.logging.level = level;
        }

        config.engine.validate()?;
        Ok(config)
    }
}
