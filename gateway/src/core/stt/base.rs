use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by an upstream STT session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum STTError {
    /// Connection or handshake could not be completed
    #[error("STT upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// An audio frame could not be delivered in time
    #[error("Failed to send to STT upstream: {0}")]
    UpstreamSendError(String),

    /// The upstream closed the connection
    #[error("STT upstream closed: {0}")]
    UpstreamClosed(String),

    /// The upstream reported an error or sent an unparsable message
    #[error("STT upstream error: {0}")]
    UpstreamError(String),

    #[error("STT session is not connected")]
    NotConnected,
}

pub type STTResult<T> = Result<T, STTError>;

/// Lifecycle of one upstream STT connection.
///
/// `Disconnected → Connecting → Connected → (Failed | Closed)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum STTConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// One transcription result as reported by the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
        }
    }
}

/// What happened on the upstream connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum STTEventKind {
    /// A non-final fragment
    Partial(TranscriptEvent),
    /// The assembled text of one finalized utterance
    Final(String),
    /// The upstream closed cleanly; no further events follow
    Closed,
    /// Terminal failure; no further events follow
    Error(STTError),
}

/// Event delivered to the session, tagged with the STT generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct STTEvent {
    pub generation: u64,
    pub kind: STTEventKind,
}

impl STTEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, STTEventKind::Closed | STTEventKind::Error(_))
    }
}

/// Accumulates non-final fragments of the current utterance.
///
/// Fragments are kept in arrival order; a final event flushes the buffer.
#[derive(Debug, Default, Clone)]
pub struct TranscriptAssembler {
    fragments: Vec<String>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transcript event.
    ///
    /// Returns the assembled utterance when `event` is final, clearing the buffer.
    pub fn push(&mut self, event: &TranscriptEvent) -> Option<String> {
        if event.is_final {
            let mut text: String = self.fragments.drain(..).collect();
            text.push_str(&event.text);
            Some(text)
        } else {
            self.fragments.push(event.text.clone());
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// One upstream speech-to-text connection.
///
/// A value is opened at most once. Events (transcripts and the terminal close or
/// error) are pushed into the channel passed to [`BaseSTT::open`] by a receive loop
/// that lives until [`BaseSTT::close`] or the upstream goes away.
#[async_trait]
pub trait BaseSTT: Send + Sync {
    /// Connect and send the authentication/configuration handshake.
    async fn open(&mut self, generation: u64, events: mpsc::Sender<STTEvent>) -> STTResult<()>;

    /// Forward one audio frame, preserving call order.
    async fn send_audio(&mut self, audio: Bytes) -> STTResult<()>;

    /// Ask the upstream to flush the current utterance.
    async fn finish(&mut self) -> STTResult<()>;

    /// Close the connection. Safe to call repeatedly.
    async fn close(&mut self);

    fn state(&self) -> STTConnectionState;

    fn is_ready(&self) -> bool {
        self.state() == STTConnectionState::Connected
    }

    fn provider_name(&self) -> &'static str;
}

/// Creates fresh, unopened STT sessions.
pub trait STTFactory: Send + Sync {
    fn create(&self) -> Box<dyn BaseSTT>;
}
