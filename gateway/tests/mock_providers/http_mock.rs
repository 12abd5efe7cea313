//! HTTP mock for the streaming TTS upstream
//!
//! Serves `POST /v1/text-to-speech/{voice_id}/stream` with a chunked body so the
//! gateway sees audio arrive in several pieces.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Response, StatusCode},
    routing::post,
};
use bytes::Bytes;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One request as the mock saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub voice_id: String,
    pub api_key: Option<String>,
    pub accept: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct TtsMockBehavior {
    pub chunks: Vec<Bytes>,
    /// Pause before each chunk
    pub chunk_delay: Duration,
    /// Reply with this status and body instead of audio
    pub fail_with: Option<(StatusCode, String)>,
}

impl Default for TtsMockBehavior {
    fn default() -> Self {
        Self {
            chunks: vec![
                Bytes::from_static(b"ID3-chunk-1"),
                Bytes::from_static(b"chunk-2"),
                Bytes::from_static(b"chunk-3"),
            ],
            chunk_delay: Duration::from_millis(5),
            fail_with: None,
        }
    }
}

struct MockState {
    behavior: TtsMockBehavior,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct TtsMockServer {
    pub base_url: String,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl Drop for TtsMockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl TtsMockServer {
    pub async fn start(behavior: TtsMockBehavior) -> Self {
        let state = Arc::new(MockState {
            behavior,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/text-to-speech/{voice_id}/stream", post(tts_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn expected_audio(&self) -> Vec<u8> {
        self.state.behavior.chunks.concat()
    }
}

async fn tts_handler(
    State(state): State<Arc<MockState>>,
    Path(voice_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response<Body> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().unwrap().push(RecordedRequest {
        voice_id,
        api_key: header("xi-api-key"),
        accept: header("accept"),
        body,
    });

    if let Some((status, body)) = &state.behavior.fail_with {
        return Response::builder()
            .status(*status)
            .body(Body::from(body.clone()))
            .unwrap();
    }

    let delay = state.behavior.chunk_delay;
    let chunks = state.behavior.chunks.clone().into_iter();
    let stream = futures::stream::unfold(chunks, move |mut chunks| async move {
        let chunk = chunks.next()?;
        tokio::time::sleep(delay).await;
        Some((Ok::<_, std::io::Error>(chunk), chunks))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "audio/mpeg")
        .body(Body::from_stream(stream))
        .unwrap()
}
