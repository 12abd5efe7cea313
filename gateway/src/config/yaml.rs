use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here take
/// precedence over environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// providers:
///   elevenlabs_api_key: "your-elevenlabs-key"
///
/// stt:
///   url: "wss://api.elevenlabs.io/v1/speech-to-text/stream-v2"
///   model_id: "eleven_multilingual_v2"
///
/// tts:
///   base_url: "https://api.elevenlabs.io"
///   voice_id: "21m00Tcm4TlvDq8ikWAM"
///   model_id: "eleven_turbo_v2"
///
/// timeouts:
///   stt_handshake_ms: 10000
///   stt_send_ms: 5000
///   tts_connect_ms: 10000
///   transcript_ms: 10000
///   session_idle_secs: 300
///
/// security:
///   cors_allowed_origins: "https://chat.example.com"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub stt: Option<SttYaml>,
    pub tts: Option<TtsYaml>,
    pub timeouts: Option<TimeoutsYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Provider credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub elevenlabs_api_key: Option<String>,
}

/// Speech-to-text upstream settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SttYaml {
    pub url: Option<String>,
    pub model_id: Option<String>,
}

/// Text-to-speech upstream settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TtsYaml {
    pub base_url: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
}

/// Timeouts from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TimeoutsYaml {
    pub stt_handshake_ms: Option<u64>,
    pub stt_send_ms: Option<u64>,
    pub tts_connect_ms: Option<u64>,
    pub transcript_ms: Option<u64>,
    pub session_idle_secs: Option<u64>,
}

/// Security settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    /// Load a YAML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_str(&contents)
    }

    /// Parse YAML configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a mapping
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}
