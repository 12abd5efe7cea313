use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised while fetching synthesized speech
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TTSError {
    #[error("TTS connection failed: {0}")]
    ConnectionFailed(String),

    #[error("TTS request timed out: {0}")]
    Timeout(String),

    #[error("TTS upstream returned {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("TTS stream error: {0}")]
    StreamError(String),

    /// The owning session cancelled the fetch
    #[error("TTS fetch cancelled")]
    Cancelled,
}

pub type TTSResult<T> = Result<T, TTSError>;

/// Receives the output of one fetch.
///
/// `on_audio` is called once per chunk in arrival order. Exactly one of
/// `on_complete` / `on_error` follows, unless the fetch was cancelled, in which
/// case neither is called.
pub trait AudioCallback: Send + Sync {
    fn on_audio(&self, chunk: Bytes) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    fn on_error(&self, error: TTSError) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    fn on_complete(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Streaming speech synthesis.
#[async_trait]
pub trait BaseTTS: Send + Sync {
    /// Synthesize `text` and relay audio to `callback` as it arrives.
    ///
    /// Returns once the stream has ended, failed or been cancelled through `cancel`.
    async fn fetch_and_relay(
        &self,
        text: &str,
        callback: Arc<dyn AudioCallback>,
        cancel: CancellationToken,
    ) -> TTSResult<()>;

    fn provider_name(&self) -> &'static str;
}
