//! Configuration module for the live-chat gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//!
//! The provider credential is the only required value. A missing credential is a
//! startup-fatal [`ConfigError::MissingCredential`]; it is never reported per request.
//!
//! # Example
//! ```rust,no_run
//! use livechat_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

mod env;
mod yaml;

pub use yaml::YamlConfig;

/// Default ElevenLabs realtime speech-to-text endpoint
pub const DEFAULT_STT_URL: &str = "wss://api.elevenlabs.io/v1/speech-to-text/stream-v2";
/// Default STT model sent in the upstream handshake
pub const DEFAULT_STT_MODEL_ID: &str = "eleven_multilingual_v2";
/// Default ElevenLabs REST base URL used for speech synthesis
pub const DEFAULT_TTS_BASE_URL: &str = "https://api.elevenlabs.io";
/// Default synthesis voice ("Rachel")
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;

/// Errors raised while loading configuration.
///
/// All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The provider credential is absent or empty
    #[error("Missing credential: {0} must be set")]
    MissingCredential(&'static str),

    /// A value is present but cannot be used
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    /// The YAML file could not be read
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The YAML file is malformed
    #[error("Failed to parse YAML config: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
}

/// Result alias for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Upstream and session timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Upper bound for connecting to the STT upstream and sending the handshake
    pub stt_handshake: Duration,
    /// Upper bound for queueing one audio frame towards the STT upstream
    pub stt_send: Duration,
    /// Upper bound for connecting to the TTS upstream and receiving response headers
    pub tts_connect: Duration,
    /// How long the session waits for a final transcript after end-of-stream
    pub transcript: Duration,
    /// Idle time after which a silent client connection is closed
    pub session_idle: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stt_handshake: Duration::from_millis(10_000),
            stt_send: Duration::from_millis(5_000),
            tts_connect: Duration::from_millis(10_000),
            transcript: Duration::from_millis(10_000),
            session_idle: Duration::from_secs(300),
        }
    }
}

/// Server configuration
///
/// Contains everything needed to run the gateway:
/// - Server settings (host, port)
/// - Provider credential and endpoints for STT and TTS
/// - Upstream and session timeouts
/// - Security settings (CORS)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Provider credential (shared by STT and TTS)
    pub elevenlabs_api_key: String,

    // STT upstream
    pub stt_url: String,
    pub stt_model_id: String,

    // TTS upstream
    pub tts_base_url: String,
    pub voice_id: String,
    pub tts_model_id: Option<String>,

    pub timeouts: TimeoutConfig,

    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (same-origin only)
    pub cors_allowed_origins: Option<String>,
}

/// Zeroize the provider credential when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.elevenlabs_api_key.zeroize();
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingCredential`] when `ELEVENLABS_API_KEY` is not set,
    /// or [`ConfigError::InvalidValue`] when a numeric variable cannot be parsed.
    pub fn from_env() -> ConfigResult<Self> {
        Self::build(YamlConfig::default())
    }

    /// Load configuration from a YAML file with environment variables as the base.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values (loaded in `main`)
    /// 4. Default values
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let yaml_config = YamlConfig::from_file(path)?;
        Self::build(yaml_config)
    }

    fn build(yaml: YamlConfig) -> ConfigResult<Self> {
        let server = yaml.server.unwrap_or_default();
        let providers = yaml.providers.unwrap_or_default();
        let stt = yaml.stt.unwrap_or_default();
        let tts = yaml.tts.unwrap_or_default();
        let timeouts = yaml.timeouts.unwrap_or_default();
        let security = yaml.security.unwrap_or_default();

        let defaults = TimeoutConfig::default();

        let config = ServerConfig {
            host: server
                .host
                .or_else(|| env::var("HOST"))
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: match server.port {
                Some(port) => port,
                None => env::parse("PORT")?.unwrap_or(DEFAULT_PORT),
            },
            elevenlabs_api_key: providers
                .elevenlabs_api_key
                .or_else(|| env::var("ELEVENLABS_API_KEY"))
                .unwrap_or_default(),
            stt_url: stt
                .url
                .or_else(|| env::var("ELEVENLABS_STT_URL"))
                .unwrap_or_else(|| DEFAULT_STT_URL.to_string()),
            stt_model_id: stt
                .model_id
                .or_else(|| env::var("ELEVENLABS_STT_MODEL"))
                .unwrap_or_else(|| DEFAULT_STT_MODEL_ID.to_string()),
            tts_base_url: tts
                .base_url
                .or_else(|| env::var("ELEVENLABS_TTS_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_TTS_BASE_URL.to_string()),
            voice_id: tts
                .voice_id
                .or_else(|| env::var("ELEVENLABS_VOICE_ID"))
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            tts_model_id: tts.model_id.or_else(|| env::var("ELEVENLABS_TTS_MODEL")),
            timeouts: TimeoutConfig {
                stt_handshake: millis(
                    "STT_HANDSHAKE_TIMEOUT_MS",
                    timeouts.stt_handshake_ms,
                    defaults.stt_handshake,
                )?,
                stt_send: millis("STT_SEND_TIMEOUT_MS", timeouts.stt_send_ms, defaults.stt_send)?,
                tts_connect: millis(
                    "TTS_CONNECT_TIMEOUT_MS",
                    timeouts.tts_connect_ms,
                    defaults.tts_connect,
                )?,
                transcript: millis(
                    "TRANSCRIPT_TIMEOUT_MS",
                    timeouts.transcript_ms,
                    defaults.transcript,
                )?,
                session_idle: match timeouts.session_idle_secs {
                    Some(secs) => Duration::from_secs(secs),
                    None => env::parse::<u64>("SESSION_IDLE_TIMEOUT_SECS")?
                        .map(Duration::from_secs)
                        .unwrap_or(defaults.session_idle),
                },
            },
            cors_allowed_origins: security
                .cors_allowed_origins
                .or_else(|| env::var("CORS_ALLOWED_ORIGINS")),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.elevenlabs_api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("ELEVENLABS_API_KEY"));
        }
        if self.voice_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ELEVENLABS_VOICE_ID",
                message: "voice id must not be empty".to_string(),
            });
        }
        if url::Url::parse(&self.stt_url).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "ELEVENLABS_STT_URL",
                message: format!("'{}' is not a valid URL", self.stt_url),
            });
        }
        if url::Url::parse(&self.tts_base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "ELEVENLABS_TTS_BASE_URL",
                message: format!("'{}' is not a valid URL", self.tts_base_url),
            });
        }

        let timeouts = [
            ("STT_HANDSHAKE_TIMEOUT_MS", self.timeouts.stt_handshake),
            ("STT_SEND_TIMEOUT_MS", self.timeouts.stt_send),
            ("TTS_CONNECT_TIMEOUT_MS", self.timeouts.tts_connect),
            ("TRANSCRIPT_TIMEOUT_MS", self.timeouts.transcript),
            ("SESSION_IDLE_TIMEOUT_SECS", self.timeouts.session_idle),
        ];
        for (key, value) in timeouts {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key,
                    message: "timeout must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the server address as a string in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn millis(key: &'static str, yaml: Option<u64>, default: Duration) -> ConfigResult<Duration> {
    Ok(match yaml {
        Some(ms) => Duration::from_millis(ms),
        None => env::parse::<u64>(key)?
            .map(Duration::from_millis)
            .unwrap_or(default),
    })
}
