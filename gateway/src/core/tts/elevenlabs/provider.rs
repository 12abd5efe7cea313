//! ElevenLabs streaming text-to-speech provider.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::config::ElevenLabsTTSConfig;
use crate::core::tts::base::{AudioCallback, BaseTTS, TTSError, TTSResult};

/// Request body for the streaming endpoint.
#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_id: Option<&'a str>,
}

/// Relays ElevenLabs synthesized audio chunk by chunk.
///
/// Nothing is buffered: each body chunk is handed to the callback as soon as
/// `reqwest` yields it.
#[derive(Debug, Clone)]
pub struct ElevenLabsTTS {
    client: reqwest::Client,
    config: Arc<ElevenLabsTTSConfig>,
}

impl ElevenLabsTTS {
    pub fn new(config: ElevenLabsTTSConfig) -> TTSResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TTSError::ConnectionFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    async fn fail(callback: &Arc<dyn AudioCallback>, error: TTSError) -> TTSResult<()> {
        error!("ElevenLabs TTS failed: {}", error);
        callback.on_error(error.clone()).await;
        Err(error)
    }
}

#[async_trait]
impl BaseTTS for ElevenLabsTTS {
    async fn fetch_and_relay(
        &self,
        text: &str,
        callback: Arc<dyn AudioCallback>,
        cancel: CancellationToken,
    ) -> TTSResult<()> {
        if cancel.is_cancelled() {
            return Err(TTSError::Cancelled);
        }

        let body = SynthesisRequest {
            text,
            model_id: self.config.model_id.as_deref(),
        };
        let request = self
            .client
            .post(self.config.stream_url())
            .header("xi-api-key", &self.config.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "audio/mpeg")
            .json(&body);

        debug!(chars = text.len(), voice_id = %self.config.voice_id, "Requesting ElevenLabs TTS stream");

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TTSError::Cancelled),
            sent = timeout(self.config.connect_timeout, request.send()) => sent,
        };

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => {
                return Self::fail(&callback, TTSError::Timeout(e.to_string())).await;
            }
            Ok(Err(e)) => {
                return Self::fail(&callback, TTSError::ConnectionFailed(e.to_string())).await;
            }
            Err(_) => {
                let error = TTSError::Timeout(format!(
                    "no response within {:?}",
                    self.config.connect_timeout
                ));
                return Self::fail(&callback, error).await;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = TTSError::HttpStatus {
                status: status.as_u16(),
                body,
            };
            return Self::fail(&callback, error).await;
        }

        let mut stream = response.bytes_stream();
        let mut total_bytes = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(total_bytes, "ElevenLabs TTS relay cancelled");
                    return Err(TTSError::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    total_bytes += chunk.len();
                    callback.on_audio(chunk).await;
                }
                Some(Err(e)) => {
                    return Self::fail(&callback, TTSError::StreamError(e.to_string())).await;
                }
                None => break,
            }
        }

        info!(total_bytes, "ElevenLabs TTS stream complete");
        callback.on_complete().await;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }
}
