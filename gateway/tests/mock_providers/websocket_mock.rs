//! WebSocket mock for the streaming STT upstream
//!
//! Speaks the ElevenLabs framing: the first text frame is the credential handshake,
//! audio arrives as `{"audio": "<base64>"}` and `{"end_stream": true}` asks for the
//! transcript. Scripted replies are sent in order when the end-of-stream arrives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// How the mock responds on each connection.
#[derive(Debug, Clone, Default)]
pub struct SttMockBehavior {
    /// `(text, is_final)` pairs sent after `end_stream`
    pub transcripts: Vec<(String, bool)>,
    /// Reply to the handshake with this error and close
    pub reject_handshake: Option<String>,
    /// Close the socket after replying to `end_stream`
    pub close_after_end_stream: bool,
    /// Complete the upgrade, then never read another frame
    pub stop_reading: bool,
}

impl SttMockBehavior {
    pub fn with_final(text: &str) -> Self {
        Self {
            transcripts: vec![(text.to_string(), true)],
            ..Default::default()
        }
    }
}

/// Everything the gateway sent, across all connections.
#[derive(Debug, Default)]
pub struct SttMockRecord {
    pub connections: AtomicU64,
    pub handshakes: Mutex<Vec<Value>>,
    pub audio: Mutex<Vec<Vec<u8>>>,
    pub end_streams: AtomicU64,
    pub closed_by_client: AtomicU64,
}

impl SttMockRecord {
    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn end_stream_count(&self) -> u64 {
        self.end_streams.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> u64 {
        self.closed_by_client.load(Ordering::SeqCst)
    }

    pub fn audio_frames(&self) -> Vec<Vec<u8>> {
        self.audio.lock().unwrap().clone()
    }

    pub fn handshakes(&self) -> Vec<Value> {
        self.handshakes.lock().unwrap().clone()
    }
}

pub struct SttMockServer {
    pub url: String,
    pub record: Arc<SttMockRecord>,
    handle: JoinHandle<()>,
}

impl Drop for SttMockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl SttMockServer {
    pub async fn start(behavior: SttMockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let record = Arc::new(SttMockRecord::default());
        let behavior = Arc::new(behavior);

        let accept_record = record.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let record = accept_record.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, behavior, record).await {
                        eprintln!("STT mock connection error: {}", e);
                    }
                });
            }
        });

        Self {
            url: format!("ws://{}/v1/speech-to-text/stream", addr),
            record,
            handle,
        }
    }

    /// Accept TCP connections but never answer the WebSocket upgrade.
    pub async fn start_unresponsive() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let record = Arc::new(SttMockRecord::default());

        let accept_record = record.clone();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                accept_record.connections.fetch_add(1, Ordering::SeqCst);
                held.push(stream);
            }
        });

        Self {
            url: format!("ws://{}/v1/speech-to-text/stream", addr),
            record,
            handle,
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    behavior: Arc<SttMockBehavior>,
    record: Arc<SttMockRecord>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    record.connections.fetch_add(1, Ordering::SeqCst);

    if behavior.stop_reading {
        // Hold the socket open so the client's writes back up
        let _held = ws_stream;
        std::future::pending::<()>().await;
        return Ok(());
    }

    let (mut write, mut read) = ws_stream.split();

    let mut handshake_done = false;

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                let value: Value = serde_json::from_str(text.as_str())?;

                if !handshake_done {
                    record.handshakes.lock().unwrap().push(value);
                    handshake_done = true;

                    if let Some(detail) = &behavior.reject_handshake {
                        let error = json!({"message_type": "auth_error", "message": detail});
                        write.send(Message::Text(error.to_string().into())).await?;
                        write.send(Message::Close(None)).await?;
                        return Ok(());
                    }
                    continue;
                }

                if let Some(audio) = value.get("audio").and_then(Value::as_str) {
                    record.audio.lock().unwrap().push(STANDARD.decode(audio)?);
                } else if value.get("end_stream").and_then(Value::as_bool) == Some(true) {
                    record.end_streams.fetch_add(1, Ordering::SeqCst);
                    for (text, is_final) in &behavior.transcripts {
                        let reply = json!({"text": text, "is_final": is_final});
                        write.send(Message::Text(reply.to_string().into())).await?;
                    }
                    if behavior.close_after_end_stream {
                        write.send(Message::Close(None)).await?;
                        return Ok(());
                    }
                }
            }
            Message::Close(_) => {
                record.closed_by_client.fetch_add(1, Ordering::SeqCst);
                break;
            }
            Message::Ping(data) => write.send(Message::Pong(data)).await?,
            _ => {}
        }
    }

    Ok(())
}
