use std::fmt;
use std::time::Duration;

use crate::config::{DEFAULT_TTS_BASE_URL, DEFAULT_VOICE_ID, ServerConfig};

/// Settings for the ElevenLabs streaming synthesis endpoint.
#[derive(Clone)]
pub struct ElevenLabsTTSConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: Option<String>,
    /// Bound on connecting and receiving response headers
    pub connect_timeout: Duration,
}

impl ElevenLabsTTSConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_TTS_BASE_URL.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            api_key: config.elevenlabs_api_key.clone(),
            base_url: config.tts_base_url.clone(),
            voice_id: config.voice_id.clone(),
            model_id: config.tts_model_id.clone(),
            connect_timeout: config.timeouts.tts_connect,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// `{base}/v1/text-to-speech/{voice_id}/stream`
    pub fn stream_url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        )
    }
}

impl fmt::Debug for ElevenLabsTTSConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevenLabsTTSConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Drop for ElevenLabsTTSConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.api_key.zeroize();
    }
}
