//! Per-connection state machine tying the client channel to the STT and TTS upstreams.
//!
//! Everything a session owns is mutated from a single event loop ([`Session::run`]).
//! Concurrent activities (the STT receive loop, TTS relays) report back through
//! channels; only the client's outbound queue is shared, and it has a single writer.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::{CloseReason, SessionState};
use crate::config::ServerConfig;
use crate::core::channel::{AudioPath, ChannelError, ClientSender};
use crate::core::codec::{ClientFrame, InboundFrame, StatusKind, decode_inbound};
use crate::core::stt::{BaseSTT, STTError, STTEvent, STTEventKind, STTFactory};
use crate::core::tts::{AudioCallback, BaseTTS, TTSError, TTSResult};

/// Capacity of the STT event queue
const STT_EVENT_BUFFER_SIZE: usize = 256;

/// Upper bound for releasing one resource during teardown
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Client disconnected")]
    ClientDisconnected,
}

impl From<ChannelError> for SessionError {
    fn from(_: ChannelError) -> Self {
        SessionError::ClientDisconnected
    }
}

/// Timeouts applied by the session loop.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// How long `Thinking` waits for a final transcript
    pub transcript_timeout: Duration,
    /// Inactivity after which the session closes
    pub idle_timeout: Duration,
}

impl SessionConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            transcript_timeout: config.timeouts.transcript,
            idle_timeout: config.timeouts.session_idle,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transcript_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Outcome of one TTS relay task.
#[derive(Debug)]
pub(crate) struct RelayOutcome {
    pub utterance: u64,
    pub result: TTSResult<()>,
}

struct RelayHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop(CloseReason),
}

type FlowResult = Result<Flow, SessionError>;

/// Forwards TTS audio to the client through an exclusively held audio path.
struct RelayCallback {
    path: AudioPath,
    cancel: CancellationToken,
    utterance: u64,
}

impl AudioCallback for RelayCallback {
    fn on_audio(&self, chunk: Bytes) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                return;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                sent = self.path.send_audio(chunk) => {
                    if sent.is_err() {
                        debug!(utterance = self.utterance, "Client gone, stopping relay");
                        self.cancel.cancel();
                    }
                }
            }
        })
    }

    fn on_error(&self, error: TTSError) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            warn!(utterance = self.utterance, "TTS relay error: {}", error);
        })
    }

    fn on_complete(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            debug!(utterance = self.utterance, "TTS relay complete");
        })
    }
}

/// Session state and owned resources.
pub(crate) struct Orchestrator {
    pub(crate) id: Uuid,
    pub(crate) state: SessionState,
    config: SessionConfig,
    client: ClientSender,
    stt_factory: Arc<dyn STTFactory>,
    tts: Arc<dyn BaseTTS>,
    stt: Option<Box<dyn BaseSTT>>,
    stt_generation: u64,
    stt_events_tx: mpsc::Sender<STTEvent>,
    relay_tx: mpsc::UnboundedSender<RelayOutcome>,
    relays: HashMap<u64, RelayHandle>,
    next_utterance: u64,
    /// Finalized segments since the last dispatched utterance
    pub(crate) transcript: Vec<String>,
    pub(crate) thinking_deadline: Option<Instant>,
    /// Set after a failed STT open; audio is dropped until the client's next end_stream
    discard_audio: bool,
    cancel: CancellationToken,
}

impl Orchestrator {
    async fn send_status(&self, kind: StatusKind) -> Result<(), SessionError> {
        self.client.send_status_kind(kind).await?;
        Ok(())
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            info!(session_id = %self.id, from = %self.state, to = %next, "Session state change");
            self.state = next;
        }
    }

    pub(crate) async fn on_inbound(&mut self, frame: InboundFrame) -> FlowResult {
        match decode_inbound(frame) {
            Ok(Some(ClientFrame::Audio(data))) => self.on_audio(data).await,
            Ok(Some(ClientFrame::EndStream)) => self.on_end_stream().await,
            Ok(Some(ClientFrame::Disconnect)) => Ok(Flow::Stop(CloseReason::ClientDisconnected)),
            Ok(None) => {
                debug!(session_id = %self.id, "Ignoring unrecognized control message");
                Ok(Flow::Continue)
            }
            Err(e) => {
                warn!(session_id = %self.id, "Dropping frame: {}", e);
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_audio(&mut self, data: Bytes) -> FlowResult {
        match self.state {
            SessionState::Closed => Ok(Flow::Continue),
            SessionState::Idle | SessionState::Speaking => {
                if self.discard_audio {
                    debug!(session_id = %self.id, "Dropping audio until next end_stream");
                    return Ok(Flow::Continue);
                }
                if !self.open_stt().await? {
                    return Ok(Flow::Continue);
                }
                self.set_state(SessionState::Listening);
                self.send_status(StatusKind::Listening).await?;
                self.forward_audio(data).await
            }
            SessionState::Listening | SessionState::Thinking => self.forward_audio(data).await,
        }
    }

    /// Open a fresh STT session. On failure the client is told and `false` returned.
    async fn open_stt(&mut self) -> Result<bool, SessionError> {
        self.stt_generation += 1;
        let generation = self.stt_generation;
        let mut stt = self.stt_factory.create();

        match stt.open(generation, self.stt_events_tx.clone()).await {
            Ok(()) => {
                info!(session_id = %self.id, generation, provider = stt.provider_name(), "STT session opened");
                self.stt = Some(stt);
                Ok(true)
            }
            Err(e) => {
                error!(session_id = %self.id, generation, "Failed to open STT session: {}", e);
                stt.close().await;
                self.discard_audio = true;
                self.send_status(StatusKind::Error).await?;
                Ok(false)
            }
        }
    }

    async fn forward_audio(&mut self, data: Bytes) -> FlowResult {
        let Some(stt) = self.stt.as_mut() else {
            debug!(session_id = %self.id, "No STT session, dropping audio frame");
            return Ok(Flow::Continue);
        };

        match stt.send_audio(data).await {
            Ok(()) => Ok(Flow::Continue),
            Err(e) => {
                error!(session_id = %self.id, "Failed to forward audio: {}", e);
                self.on_stt_failure(e).await
            }
        }
    }

    async fn on_end_stream(&mut self) -> FlowResult {
        self.discard_audio = false;

        if self.state != SessionState::Listening {
            debug!(session_id = %self.id, state = %self.state, "Ignoring end_stream");
            return Ok(Flow::Continue);
        }

        self.set_state(SessionState::Thinking);
        self.send_status(StatusKind::Thinking).await?;
        self.thinking_deadline = Some(Instant::now() + self.config.transcript_timeout);

        if let Some(stt) = self.stt.as_mut()
            && let Err(e) = stt.finish().await
        {
            error!(session_id = %self.id, "Failed to flush STT session: {}", e);
            return self.on_stt_failure(e).await;
        }

        Ok(Flow::Continue)
    }

    pub(crate) async fn on_stt_event(&mut self, event: STTEvent) -> FlowResult {
        if self.stt.is_none() || event.generation != self.stt_generation {
            debug!(
                session_id = %self.id,
                generation = event.generation,
                terminal = event.is_terminal(),
                "Ignoring stale STT event"
            );
            return Ok(Flow::Continue);
        }

        match event.kind {
            STTEventKind::Partial(partial) => {
                debug!(session_id = %self.id, text = %partial.text, "Partial transcript");
                Ok(Flow::Continue)
            }
            STTEventKind::Final(text) => {
                debug!(session_id = %self.id, text = %text, "Final transcript");
                self.transcript.push(text);
                if self.state == SessionState::Thinking {
                    self.dispatch_utterance(false).await
                } else {
                    Ok(Flow::Continue)
                }
            }
            STTEventKind::Closed => {
                info!(session_id = %self.id, "STT upstream closed");
                self.on_stt_failure(STTError::UpstreamClosed("closed by upstream".to_string()))
                    .await
            }
            STTEventKind::Error(e) => {
                error!(session_id = %self.id, "STT upstream error: {}", e);
                self.on_stt_failure(e).await
            }
        }
    }

    /// The STT connection is gone or unusable.
    async fn on_stt_failure(&mut self, error: STTError) -> FlowResult {
        self.close_stt().await;

        match self.state {
            SessionState::Thinking => {
                // A clean close after end_stream just means no more transcripts
                let failed = !matches!(error, STTError::UpstreamClosed(_));
                self.dispatch_utterance(failed).await
            }
            SessionState::Listening => {
                // The next audio frame reopens; only a failed open waits for the next press
                self.transcript.clear();
                self.set_state(SessionState::Idle);
                self.send_status(StatusKind::Error).await?;
                Ok(Flow::Continue)
            }
            _ => Ok(Flow::Continue),
        }
    }

    pub(crate) async fn on_transcript_timeout(&mut self) -> FlowResult {
        if self.state != SessionState::Thinking {
            self.thinking_deadline = None;
            return Ok(Flow::Continue);
        }
        warn!(session_id = %self.id, "Timed out waiting for final transcript");
        self.close_stt().await;
        self.dispatch_utterance(true).await
    }

    /// Leave `Thinking` with whatever has been transcribed.
    ///
    /// Non-empty text starts a TTS relay; empty text returns to `Idle` without one.
    /// `failed` reports an error status when there is nothing to say.
    async fn dispatch_utterance(&mut self, failed: bool) -> FlowResult {
        self.thinking_deadline = None;
        self.close_stt().await;

        let text = self
            .transcript
            .drain(..)
            .map(|segment| segment.trim().to_string())
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            self.set_state(SessionState::Idle);
            let kind = if failed {
                StatusKind::Error
            } else {
                StatusKind::Idle
            };
            self.send_status(kind).await?;
            return Ok(Flow::Continue);
        }

        self.set_state(SessionState::Speaking);
        self.send_status(StatusKind::Speaking).await?;
        self.start_relay(text);
        Ok(Flow::Continue)
    }

    fn start_relay(&mut self, text: String) {
        self.next_utterance += 1;
        let utterance = self.next_utterance;
        let cancel = self.cancel.child_token();

        info!(session_id = %self.id, utterance, chars = text.len(), "Starting TTS relay");

        let tts = self.tts.clone();
        let client = self.client.clone();
        let done_tx = self.relay_tx.clone();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let path = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                path = client.acquire_audio_path() => Some(path),
            };

            let result = match path {
                Some(path) => {
                    let callback: Arc<dyn AudioCallback> = Arc::new(RelayCallback {
                        path,
                        cancel: token.clone(),
                        utterance,
                    });
                    let result = tts.fetch_and_relay(&text, callback, token.clone()).await;
                    if token.is_cancelled() {
                        Err(TTSError::Cancelled)
                    } else {
                        result
                    }
                }
                None => Err(TTSError::Cancelled),
            };

            let _ = done_tx.send(RelayOutcome { utterance, result });
        });

        self.relays.insert(utterance, RelayHandle { cancel, handle });
    }

    pub(crate) async fn on_relay_finished(&mut self, outcome: RelayOutcome) -> FlowResult {
        self.relays.remove(&outcome.utterance);

        match outcome.result {
            Ok(()) => {
                if self.state == SessionState::Speaking && self.relays.is_empty() {
                    self.set_state(SessionState::Idle);
                    self.send_status(StatusKind::Idle).await?;
                }
            }
            Err(TTSError::Cancelled) => {
                debug!(session_id = %self.id, utterance = outcome.utterance, "TTS relay cancelled");
                if self.state == SessionState::Speaking && self.relays.is_empty() {
                    self.set_state(SessionState::Idle);
                }
            }
            Err(e) => {
                error!(session_id = %self.id, utterance = outcome.utterance, "TTS relay failed: {}", e);
                match self.state {
                    SessionState::Speaking | SessionState::Idle => {
                        if self.relays.is_empty() {
                            self.set_state(SessionState::Idle);
                        }
                        self.send_status(StatusKind::Error).await?;
                    }
                    // The user is already speaking again
                    _ => {}
                }
            }
        }

        Ok(Flow::Continue)
    }

    async fn close_stt(&mut self) {
        if let Some(mut stt) = self.stt.take() {
            stt.close().await;
            debug!(session_id = %self.id, generation = self.stt_generation, "STT session closed");
        }
    }

    /// Release everything the session owns. Repeated calls are no-ops.
    pub(crate) async fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.set_state(SessionState::Closed);
        self.cancel.cancel();
        self.thinking_deadline = None;
        self.transcript.clear();

        self.close_stt().await;

        for (utterance, mut relay) in self.relays.drain() {
            relay.cancel.cancel();
            if timeout(TEARDOWN_TIMEOUT, &mut relay.handle).await.is_err() {
                warn!(session_id = %self.id, utterance, "TTS relay did not stop in time, aborting");
                relay.handle.abort();
            }
        }

        if timeout(TEARDOWN_TIMEOUT, self.client.close()).await.is_err() {
            warn!(session_id = %self.id, "Client close not queued within {:?}", TEARDOWN_TIMEOUT);
        }
        info!(session_id = %self.id, "Session closed");
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// One client session.
///
/// Build with [`Session::new`], then drive it with [`Session::run`] until the
/// client goes away.
pub struct Session {
    pub(super) orchestrator: Orchestrator,
    stt_events_rx: mpsc::Receiver<STTEvent>,
    relay_rx: mpsc::UnboundedReceiver<RelayOutcome>,
}

impl Session {
    pub fn new(
        client: ClientSender,
        stt_factory: Arc<dyn STTFactory>,
        tts: Arc<dyn BaseTTS>,
        config: SessionConfig,
    ) -> Self {
        let (stt_events_tx, stt_events_rx) = mpsc::channel(STT_EVENT_BUFFER_SIZE);
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();

        Self {
            orchestrator: Orchestrator {
                id: Uuid::new_v4(),
                state: SessionState::Idle,
                config,
                client,
                stt_factory,
                tts,
                stt: None,
                stt_generation: 0,
                stt_events_tx,
                relay_tx,
                relays: HashMap::new(),
                next_utterance: 0,
                transcript: Vec::new(),
                thinking_deadline: None,
                discard_audio: false,
                cancel: CancellationToken::new(),
            },
            stt_events_rx,
            relay_rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.orchestrator.id
    }

    pub fn state(&self) -> SessionState {
        self.orchestrator.state
    }

    /// Drive the session until the client disconnects or goes idle.
    ///
    /// Teardown has completed by the time this returns.
    pub async fn run<S>(self, inbound: S) -> CloseReason
    where
        S: Stream<Item = InboundFrame> + Unpin + Send,
    {
        let Session {
            mut orchestrator,
            mut stt_events_rx,
            mut relay_rx,
        } = self;
        let mut inbound = inbound;
        let idle_timeout = orchestrator.config.idle_timeout;
        let mut last_activity = Instant::now();

        info!(session_id = %orchestrator.id, "Session started");

        if let Err(e) = orchestrator.send_status(StatusKind::Idle).await {
            debug!(session_id = %orchestrator.id, "{}", e);
            orchestrator.close().await;
            return CloseReason::ClientDisconnected;
        }

        let reason = loop {
            let thinking_deadline = orchestrator.thinking_deadline;

            // Upstream results already queued were produced before any client frame
            // still waiting, so they are handled first.
            let step = tokio::select! {
                biased;
                Some(event) = stt_events_rx.recv() => orchestrator.on_stt_event(event).await,
                Some(outcome) = relay_rx.recv() => orchestrator.on_relay_finished(outcome).await,
                frame = inbound.next() => match frame {
                    Some(frame) => orchestrator.on_inbound(frame).await,
                    None => Ok(Flow::Stop(CloseReason::ClientDisconnected)),
                },
                _ = deadline(thinking_deadline) => orchestrator.on_transcript_timeout().await,
                _ = sleep_until(last_activity + idle_timeout) => {
                    info!(session_id = %orchestrator.id, "Session idle timeout");
                    Ok(Flow::Stop(CloseReason::IdleTimeout))
                }
            };

            match step {
                Ok(Flow::Continue) => last_activity = Instant::now(),
                Ok(Flow::Stop(reason)) => break reason,
                Err(SessionError::ClientDisconnected) => break CloseReason::ClientDisconnected,
            }
        };

        orchestrator.close().await;
        reason
    }
}
