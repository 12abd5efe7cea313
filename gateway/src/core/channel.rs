//! Client-facing channel abstraction.
//!
//! The session never touches the transport directly. Outbound frames go through a
//! bounded queue drained by exactly one writer task, so concurrent producers (the
//! session loop and TTS relays) can never interleave a write. Inbound frames are any
//! `Stream<Item = InboundFrame>`.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

use super::codec::{OutboundFrame, StatusKind, StatusMessage};

/// Default capacity of the outbound queue
pub const OUTBOUND_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Client channel closed")]
    Closed,
}

/// Cloneable handle to the client's outbound queue.
#[derive(Clone, Debug)]
pub struct ClientSender {
    tx: mpsc::Sender<OutboundFrame>,
    audio_path: Arc<Mutex<()>>,
}

impl ClientSender {
    /// Create a sender and the receiving end for the writer task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                audio_path: Arc::new(Mutex::new(())),
            },
            rx,
        )
    }

    pub async fn send_status(&self, message: StatusMessage) -> Result<(), ChannelError> {
        self.tx
            .send(OutboundFrame::Status(message))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    pub async fn send_status_kind(&self, kind: StatusKind) -> Result<(), ChannelError> {
        self.send_status(StatusMessage::new(kind)).await
    }

    /// Wait for exclusive use of the audio path.
    ///
    /// Audio can only be sent through the returned guard. Holding it for the
    /// whole of one utterance keeps chunks of different utterances apart.
    pub async fn acquire_audio_path(&self) -> AudioPath {
        let guard = self.audio_path.clone().lock_owned().await;
        AudioPath {
            tx: self.tx.clone(),
            _guard: guard,
        }
    }

    /// Ask the writer to close the connection. Repeated calls are harmless.
    pub async fn close(&self) {
        let _ = self.tx.send(OutboundFrame::Close).await;
    }
}

/// Exclusive audio-send path held by one relay at a time.
#[derive(Debug)]
pub struct AudioPath {
    tx: mpsc::Sender<OutboundFrame>,
    _guard: OwnedMutexGuard<()>,
}

impl AudioPath {
    pub async fn send_audio(&self, data: Bytes) -> Result<(), ChannelError> {
        self.tx
            .send(OutboundFrame::Audio(data))
            .await
            .map_err(|_| ChannelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_status_and_audio_preserve_order() {
        let (sender, mut rx) = ClientSender::channel(16);

        sender.send_status_kind(StatusKind::Thinking).await.unwrap();
        let path = sender.acquire_audio_path().await;
        path.send_audio(Bytes::from_static(b"a")).await.unwrap();
        path.send_audio(Bytes::from_static(b"b")).await.unwrap();
        drop(path);

        assert!(matches!(rx.recv().await, Some(OutboundFrame::Status(s)) if s.kind == StatusKind::Thinking));
        assert_eq!(rx.recv().await, Some(OutboundFrame::Audio(Bytes::from_static(b"a"))));
        assert_eq!(rx.recv().await, Some(OutboundFrame::Audio(Bytes::from_static(b"b"))));
    }

    #[tokio::test]
    async fn test_audio_path_is_exclusive() {
        let (sender, _rx) = ClientSender::channel(16);

        let first = sender.acquire_audio_path().await;
        let second = tokio::time::timeout(Duration::from_millis(50), sender.acquire_audio_path()).await;
        assert!(second.is_err(), "second relay must wait for the first");

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(50), sender.acquire_audio_path()).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_send_after_writer_gone() {
        let (sender, rx) = ClientSender::channel(4);
        drop(rx);

        assert_eq!(
            sender.send_status_kind(StatusKind::Idle).await,
            Err(ChannelError::Closed)
        );
        sender.close().await;
    }
}
