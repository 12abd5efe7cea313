use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::session::SessionConfig;
use crate::core::stt::{ElevenLabsSTTConfig, ElevenLabsSTTFactory, STTFactory};
use crate::core::tts::{BaseTTS, ElevenLabsTTS, ElevenLabsTTSConfig, TTSResult};

/// Application state shared by all connections
pub struct AppState {
    pub config: ServerConfig,
    pub stt_factory: Arc<dyn STTFactory>,
    pub tts: Arc<dyn BaseTTS>,
}

impl AppState {
    /// Build the ElevenLabs-backed state from configuration.
    ///
    /// The credential and endpoints are handed to the providers here; nothing
    /// downstream reads the environment.
    pub fn new(config: ServerConfig) -> TTSResult<Arc<Self>> {
        let stt_factory = Arc::new(ElevenLabsSTTFactory::new(
            ElevenLabsSTTConfig::from_server_config(&config),
        ));
        let tts = Arc::new(ElevenLabsTTS::new(ElevenLabsTTSConfig::from_server_config(
            &config,
        ))?);

        Ok(Self::with_providers(config, stt_factory, tts))
    }

    /// Build state around explicit providers.
    pub fn with_providers(
        config: ServerConfig,
        stt_factory: Arc<dyn STTFactory>,
        tts: Arc<dyn BaseTTS>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            stt_factory,
            tts,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from_server_config(&self.config)
    }
}
