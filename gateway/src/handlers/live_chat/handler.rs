//! Live-chat WebSocket handler
//!
//! Adapts an axum WebSocket to the transport-neutral session: inbound messages
//! become [`InboundFrame`]s, outbound frames are written by a single sender task.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

use crate::core::channel::{ClientSender, OUTBOUND_BUFFER_SIZE};
use crate::core::codec::{InboundFrame, OutboundFrame, encode_status};
use crate::core::session::Session;
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How long the sender task may take to flush after the session ends
const SENDER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Live-chat WebSocket handler
///
/// Upgrades the HTTP connection and runs one [`Session`] for its lifetime.
pub async fn live_chat_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("Live-chat WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_live_chat_socket(socket, state))
}

/// Map one WebSocket message to a session frame.
///
/// Ping/pong are handled by axum and never reach the session.
pub(crate) fn to_inbound(message: Result<Message, axum::Error>) -> Option<InboundFrame> {
    match message {
        Ok(Message::Text(text)) => Some(InboundFrame::Text(text.as_str().to_owned())),
        Ok(Message::Binary(data)) => Some(InboundFrame::Binary(data)),
        Ok(Message::Close(_)) => Some(InboundFrame::Close),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => {
            warn!("Live-chat WebSocket error: {}", e);
            Some(InboundFrame::Close)
        }
    }
}

fn inbound_frames<S>(receiver: S) -> impl Stream<Item = InboundFrame> + Send + Unpin
where
    S: Stream<Item = Result<Message, axum::Error>> + Send + 'static,
{
    Box::pin(receiver.filter_map(|message| async move { to_inbound(message) }))
}

async fn handle_live_chat_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, receiver) = socket.split();
    let (client, mut outbound_rx): (ClientSender, mpsc::Receiver<OutboundFrame>) =
        ClientSender::channel(OUTBOUND_BUFFER_SIZE);

    // Single writer for the socket
    let mut sender_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let should_close = matches!(frame, OutboundFrame::Close);

            let result = match frame {
                OutboundFrame::Status(status) => match encode_status(&status) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to encode status message: {}", e);
                        continue;
                    }
                },
                OutboundFrame::Audio(data) => sender.send(Message::Binary(data)).await,
                OutboundFrame::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }

            if should_close {
                break;
            }
        }
    });

    let session = Session::new(
        client,
        app_state.stt_factory.clone(),
        app_state.tts.clone(),
        app_state.session_config(),
    );
    let session_id = session.id();
    info!(session_id = %session_id, "Live-chat WebSocket connection established");

    let reason = session.run(inbound_frames(receiver)).await;

    if timeout(SENDER_FLUSH_TIMEOUT, &mut sender_task).await.is_err() {
        sender_task.abort();
    }

    info!(session_id = %session_id, reason = ?reason, "Live-chat WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_to_inbound_maps_payload_kinds() {
        assert_eq!(
            to_inbound(Ok(Message::Text("{}".into()))),
            Some(InboundFrame::Text("{}".to_string()))
        );
        assert_eq!(
            to_inbound(Ok(Message::Binary(Bytes::from_static(b"pcm")))),
            Some(InboundFrame::Binary(Bytes::from_static(b"pcm")))
        );
        assert_eq!(to_inbound(Ok(Message::Close(None))), Some(InboundFrame::Close));
        assert_eq!(to_inbound(Ok(Message::Ping(Bytes::new()))), None);
    }
}
