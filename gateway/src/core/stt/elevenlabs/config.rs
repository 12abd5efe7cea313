//! Configuration for the ElevenLabs streaming STT connection.

use std::fmt;
use std::time::Duration;

use crate::config::{DEFAULT_STT_MODEL_ID, DEFAULT_STT_URL, ServerConfig};

/// Capacity of the queue between `send_audio` and the connection task
pub const AUDIO_CHANNEL_CAPACITY: usize = 32;

/// Upper bound for joining the connection task on close
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for writing the close frame to the upstream
pub const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings injected into every ElevenLabs STT session.
#[derive(Clone)]
pub struct ElevenLabsSTTConfig {
    pub api_key: String,
    pub url: String,
    pub model_id: String,
    /// Bound on connecting plus sending the handshake
    pub handshake_timeout: Duration,
    /// Bound on queueing one audio frame
    pub send_timeout: Duration,
}

impl ElevenLabsSTTConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            url: DEFAULT_STT_URL.to_string(),
            model_id: DEFAULT_STT_MODEL_ID.to_string(),
            handshake_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            api_key: config.elevenlabs_api_key.clone(),
            url: config.stt_url.clone(),
            model_id: config.stt_model_id.clone(),
            handshake_timeout: config.timeouts.stt_handshake,
            send_timeout: config.timeouts.stt_send,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

// Keep the credential out of logs
impl fmt::Debug for ElevenLabsSTTConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevenLabsSTTConfig")
            .field("api_key", &"<redacted>")
            .field("url", &self.url)
            .field("model_id", &self.model_id)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

impl Drop for ElevenLabsSTTConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.api_key.zeroize();
    }
}
