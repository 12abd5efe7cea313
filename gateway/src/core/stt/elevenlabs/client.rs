//! ElevenLabs STT WebSocket client implementation.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, protocol::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{
    AUDIO_CHANNEL_CAPACITY, CLOSE_FRAME_TIMEOUT, CLOSE_TIMEOUT, ElevenLabsSTTConfig,
};
use super::messages::{AudioMessage, AuthMessage, ElevenLabsMessage, EndStreamMessage};
use crate::core::stt::base::{
    BaseSTT, STTConnectionState, STTError, STTEvent, STTEventKind, STTFactory, STTResult,
    TranscriptAssembler,
};

/// Frames queued for the connection task.
#[derive(Debug)]
enum Outgoing {
    Audio(Bytes),
    EndStream,
}

/// Result of handling one upstream frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MessageOutcome {
    /// Keep reading, optionally delivering an event
    Continue(Option<STTEventKind>),
    /// The upstream closed the connection
    Closed(String),
}

/// ElevenLabs STT WebSocket client.
///
/// ```text
/// ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
/// │   send_audio()  │────▶│ outgoing (mpsc)  │────▶│ Connection Task │◀──▶ upstream
/// │   finish()      │     │  bounded, 32     │     └────────┬────────┘
/// └─────────────────┘     └──────────────────┘              │
///                                                           ▼
///                                              events (mpsc) ──▶ session
/// ```
///
/// The connection task owns both halves of the socket. It stops when the
/// cancellation token fires, the upstream closes, or a transport/parse error
/// occurs, and always reports the last two as a terminal [`STTEvent`].
pub struct ElevenLabsSTT {
    config: ElevenLabsSTTConfig,
    state: Arc<watch::Sender<STTConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<Outgoing>>,
    cancel: CancellationToken,
    connection_handle: Option<JoinHandle<()>>,
}

impl ElevenLabsSTT {
    pub fn new(config: ElevenLabsSTTConfig) -> Self {
        let (state, _) = watch::channel(STTConnectionState::Disconnected);
        Self {
            config,
            state: Arc::new(state),
            outgoing_tx: None,
            cancel: CancellationToken::new(),
            connection_handle: None,
        }
    }

    fn set_state(&self, state: STTConnectionState) {
        self.state.send_replace(state);
    }

    /// Map one upstream frame to an outcome.
    pub(crate) fn handle_websocket_message(
        message: Message,
        assembler: &mut TranscriptAssembler,
    ) -> Result<MessageOutcome, STTError> {
        match message {
            Message::Text(text) => {
                debug!("Received ElevenLabs STT message: {}", text);

                let parsed = ElevenLabsMessage::parse(&text).map_err(|e| {
                    STTError::UpstreamError(format!("Failed to parse upstream message: {e}"))
                })?;

                match parsed {
                    ElevenLabsMessage::Transcript(event) => {
                        if let Some(utterance) = assembler.push(&event) {
                            Ok(MessageOutcome::Continue(Some(STTEventKind::Final(utterance))))
                        } else {
                            Ok(MessageOutcome::Continue(Some(STTEventKind::Partial(event))))
                        }
                    }
                    ElevenLabsMessage::Error(detail) => Err(STTError::UpstreamError(detail)),
                    ElevenLabsMessage::Unknown(raw) => {
                        debug!("Ignoring unrecognized ElevenLabs STT message: {}", raw);
                        Ok(MessageOutcome::Continue(None))
                    }
                }
            }
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_else(|| "no close frame".to_string());
                Ok(MessageOutcome::Closed(reason))
            }
            Message::Binary(_) => {
                debug!("Received unexpected binary message from ElevenLabs STT");
                Ok(MessageOutcome::Continue(None))
            }
            _ => Ok(MessageOutcome::Continue(None)),
        }
    }
}

/// Best-effort close frame; gives up if the upstream is not reading.
async fn send_close<S>(ws_sink: &mut S, generation: u64)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    match timeout(CLOSE_FRAME_TIMEOUT, ws_sink.send(Message::Close(None))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(generation, "Failed to send close frame: {}", e),
        Err(_) => warn!(generation, "Close frame not written within {:?}", CLOSE_FRAME_TIMEOUT),
    }
}

/// Deliver an event unless the session has started tearing us down.
async fn emit(
    events: &mpsc::Sender<STTEvent>,
    cancel: &CancellationToken,
    generation: u64,
    kind: STTEventKind,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = events.send(STTEvent { generation, kind }) => sent.is_ok(),
    }
}

async fn run_connection<S, R>(
    mut ws_sink: S,
    mut ws_stream: R,
    mut outgoing_rx: mpsc::Receiver<Outgoing>,
    events: mpsc::Sender<STTEvent>,
    generation: u64,
    cancel: CancellationToken,
    state: Arc<watch::Sender<STTConnectionState>>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut assembler = TranscriptAssembler::new();

    let terminal = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                send_close(&mut ws_sink, generation).await;
                break None;
            }

            outgoing = outgoing_rx.recv() => {
                let Some(outgoing) = outgoing else {
                    // Owner dropped without closing
                    send_close(&mut ws_sink, generation).await;
                    break None;
                };

                let (payload, len) = match &outgoing {
                    Outgoing::Audio(data) => (serde_json::to_string(&AudioMessage::from_bytes(data)), data.len()),
                    Outgoing::EndStream => (serde_json::to_string(&EndStreamMessage::default()), 0),
                };
                let json = match payload {
                    Ok(json) => json,
                    Err(e) => {
                        break Some(STTEventKind::Error(STTError::UpstreamSendError(format!(
                            "Failed to serialize message: {e}"
                        ))));
                    }
                };

                // A stalled upstream must not keep the write from seeing cancellation
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(generation, "Cancelled while writing to ElevenLabs STT");
                        break None;
                    }
                    sent = ws_sink.send(Message::Text(json.into())) => sent,
                };
                if let Err(e) = sent {
                    let stt_error = STTError::UpstreamSendError(format!(
                        "Failed to send to ElevenLabs STT: {e}"
                    ));
                    error!(generation, "{}", stt_error);
                    break Some(STTEventKind::Error(stt_error));
                }

                match outgoing {
                    Outgoing::Audio(_) => debug!(generation, "Sent {} bytes of audio to ElevenLabs STT", len),
                    Outgoing::EndStream => debug!(generation, "Sent end_stream to ElevenLabs STT"),
                }
            }

            message = ws_stream.next() => {
                match message {
                    Some(Ok(msg)) => match ElevenLabsSTT::handle_websocket_message(msg, &mut assembler) {
                        Ok(MessageOutcome::Continue(Some(kind))) => {
                            if !emit(&events, &cancel, generation, kind).await {
                                break None;
                            }
                        }
                        Ok(MessageOutcome::Continue(None)) => {}
                        Ok(MessageOutcome::Closed(reason)) => {
                            info!(generation, "ElevenLabs STT WebSocket closed: {}", reason);
                            break Some(STTEventKind::Closed);
                        }
                        Err(e) => {
                            error!(generation, "ElevenLabs STT error: {}", e);
                            break Some(STTEventKind::Error(e));
                        }
                    },
                    Some(Err(e)) => {
                        let stt_error = STTError::UpstreamError(format!("WebSocket error: {e}"));
                        error!(generation, "{}", stt_error);
                        break Some(STTEventKind::Error(stt_error));
                    }
                    None => {
                        info!(generation, "ElevenLabs STT WebSocket stream ended");
                        break Some(STTEventKind::Closed);
                    }
                }
            }
        }
    };

    if !assembler.is_empty() {
        debug!(generation, "Discarding unfinished transcript fragments");
    }

    match terminal {
        Some(STTEventKind::Error(e)) => {
            state.send_replace(STTConnectionState::Failed);
            emit(&events, &cancel, generation, STTEventKind::Error(e)).await;
        }
        Some(kind) => {
            state.send_replace(STTConnectionState::Closed);
            emit(&events, &cancel, generation, kind).await;
        }
        None => {
            // Keep a failure the owner already recorded, e.g. a send timeout
            state.send_if_modified(|current| {
                if *current == STTConnectionState::Failed {
                    return false;
                }
                *current = STTConnectionState::Closed;
                true
            });
        }
    }

    debug!(generation, "ElevenLabs STT connection task finished");
}

impl Drop for ElevenLabsSTT {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl BaseSTT for ElevenLabsSTT {
    async fn open(&mut self, generation: u64, events: mpsc::Sender<STTEvent>) -> STTResult<()> {
        if self.state() != STTConnectionState::Disconnected {
            return Err(STTError::UpstreamUnavailable(
                "STT session was already opened".to_string(),
            ));
        }
        self.set_state(STTConnectionState::Connecting);

        let handshake = async {
            let (mut ws, _response) = connect_async(self.config.url.as_str())
                .await
                .map_err(|e| {
                    STTError::UpstreamUnavailable(format!("Failed to connect to ElevenLabs STT: {e}"))
                })?;

            let auth = AuthMessage {
                xi_api_key: &self.config.api_key,
                model_id: &self.config.model_id,
            };
            let json = serde_json::to_string(&auth).map_err(|e| {
                STTError::UpstreamUnavailable(format!("Failed to serialize handshake: {e}"))
            })?;
            ws.send(Message::Text(json.into())).await.map_err(|e| {
                STTError::UpstreamUnavailable(format!("Failed to send handshake: {e}"))
            })?;

            Ok::<_, STTError>(ws)
        };

        let ws = match timeout(self.config.handshake_timeout, handshake).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                error!(generation, "{}", e);
                self.set_state(STTConnectionState::Failed);
                return Err(e);
            }
            Err(_) => {
                let e = STTError::UpstreamUnavailable(format!(
                    "Handshake timed out after {:?}",
                    self.config.handshake_timeout
                ));
                error!(generation, "{}", e);
                self.set_state(STTConnectionState::Failed);
                return Err(e);
            }
        };

        let (ws_sink, ws_stream) = ws.split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Outgoing>(AUDIO_CHANNEL_CAPACITY);

        self.connection_handle = Some(tokio::spawn(run_connection(
            ws_sink,
            ws_stream,
            outgoing_rx,
            events,
            generation,
            self.cancel.clone(),
            self.state.clone(),
        )));
        self.outgoing_tx = Some(outgoing_tx);
        self.set_state(STTConnectionState::Connected);

        info!(generation, "Connected to ElevenLabs STT");
        Ok(())
    }

    async fn send_audio(&mut self, audio: Bytes) -> STTResult<()> {
        if !self.is_ready() {
            return Err(STTError::NotConnected);
        }
        let Some(tx) = self.outgoing_tx.as_ref() else {
            return Err(STTError::NotConnected);
        };

        match timeout(self.config.send_timeout, tx.send(Outgoing::Audio(audio))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                self.set_state(STTConnectionState::Failed);
                Err(STTError::UpstreamSendError(
                    "connection task is no longer running".to_string(),
                ))
            }
            Err(_) => {
                self.set_state(STTConnectionState::Failed);
                warn!("Audio frame not accepted within {:?}", self.config.send_timeout);
                Err(STTError::UpstreamSendError(format!(
                    "send timed out after {:?}",
                    self.config.send_timeout
                )))
            }
        }
    }

    async fn finish(&mut self) -> STTResult<()> {
        if !self.is_ready() {
            return Err(STTError::NotConnected);
        }
        let Some(tx) = self.outgoing_tx.as_ref() else {
            return Err(STTError::NotConnected);
        };

        match timeout(self.config.send_timeout, tx.send(Outgoing::EndStream)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(_) => {
                self.set_state(STTConnectionState::Failed);
                Err(STTError::UpstreamSendError(
                    "failed to queue end_stream".to_string(),
                ))
            }
        }
    }

    async fn close(&mut self) {
        self.cancel.cancel();
        self.outgoing_tx = None;

        if let Some(mut handle) = self.connection_handle.take() {
            if timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
                warn!(
                    "ElevenLabs STT connection task did not stop within {:?}, aborting",
                    CLOSE_TIMEOUT
                );
                handle.abort();
            }
            info!("Disconnected from ElevenLabs STT");
        }

        if self.state() != STTConnectionState::Failed {
            self.set_state(STTConnectionState::Closed);
        }
    }

    fn state(&self) -> STTConnectionState {
        *self.state.borrow()
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }
}

/// Builds [`ElevenLabsSTT`] sessions from a shared configuration.
#[derive(Debug, Clone)]
pub struct ElevenLabsSTTFactory {
    config: ElevenLabsSTTConfig,
}

impl ElevenLabsSTTFactory {
    pub fn new(config: ElevenLabsSTTConfig) -> Self {
        Self { config }
    }
}

impl STTFactory for ElevenLabsSTTFactory {
    fn create(&self) -> Box<dyn BaseSTT> {
        Box::new(ElevenLabsSTT::new(self.config.clone()))
    }
}
