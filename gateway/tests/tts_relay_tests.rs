//! ElevenLabs TTS relay tests against local HTTP upstreams.

mod mock_providers;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use livechat_gateway::config::DEFAULT_VOICE_ID;
use livechat_gateway::core::tts::{
    AudioCallback, BaseTTS, ElevenLabsTTS, ElevenLabsTTSConfig, TTSError,
};
use mock_providers::http_mock::{TtsMockBehavior, TtsMockServer};
use mock_providers::wait_for;

#[derive(Default)]
struct Collector {
    chunks: Mutex<Vec<Bytes>>,
    errors: Mutex<Vec<TTSError>>,
    completions: AtomicUsize,
}

impl Collector {
    fn audio(&self) -> Vec<u8> {
        self.chunks.lock().unwrap().concat()
    }

    fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    fn errors(&self) -> Vec<TTSError> {
        self.errors.lock().unwrap().clone()
    }
}

impl AudioCallback for Collector {
    fn on_audio(&self, chunk: Bytes) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.chunks.lock().unwrap().push(chunk);
        })
    }

    fn on_error(&self, error: TTSError) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.errors.lock().unwrap().push(error);
        })
    }

    fn on_complete(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.completions.fetch_add(1, Ordering::SeqCst);
        })
    }
}

fn provider(base_url: &str) -> ElevenLabsTTS {
    let mut config = ElevenLabsTTSConfig::new("test-key").with_base_url(base_url);
    config.connect_timeout = Duration::from_secs(2);
    ElevenLabsTTS::new(config).unwrap()
}

#[tokio::test]
async fn test_relays_chunks_in_order() {
    let server = TtsMockServer::start(TtsMockBehavior::default()).await;
    let tts = provider(&server.base_url);
    let collector = Arc::new(Collector::default());

    tts.fetch_and_relay("hello world", collector.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(collector.audio(), server.expected_audio());
    assert_eq!(collector.completions.load(Ordering::SeqCst), 1);
    assert!(collector.errors().is_empty());

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].voice_id, DEFAULT_VOICE_ID);
    assert_eq!(requests[0].api_key.as_deref(), Some("test-key"));
    assert_eq!(requests[0].accept.as_deref(), Some("audio/mpeg"));
    assert_eq!(requests[0].body, json!({"text": "hello world"}));
}

#[tokio::test]
async fn test_model_id_is_sent_when_configured() {
    let server = TtsMockServer::start(TtsMockBehavior::default()).await;
    let mut config = ElevenLabsTTSConfig::new("test-key").with_base_url(&server.base_url);
    config.voice_id = "custom-voice".to_string();
    config.model_id = Some("eleven_turbo_v2".to_string());
    let tts = ElevenLabsTTS::new(config).unwrap();

    tts.fetch_and_relay("hi", Arc::new(Collector::default()), CancellationToken::new())
        .await
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].voice_id, "custom-voice");
    assert_eq!(
        requests[0].body,
        json!({"text": "hi", "model_id": "eleven_turbo_v2"})
    );
}

#[tokio::test]
async fn test_non_success_status_reports_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/text-to-speech/{DEFAULT_VOICE_ID}/stream")))
        .and(header("xi-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let tts = provider(&server.uri());
    let collector = Arc::new(Collector::default());

    let result = tts
        .fetch_and_relay("hello", collector.clone(), CancellationToken::new())
        .await;

    let expected = TTSError::HttpStatus {
        status: 401,
        body: "invalid api key".to_string(),
    };
    assert_eq!(result, Err(expected.clone()));
    assert_eq!(collector.errors(), vec![expected]);
    assert_eq!(collector.chunk_count(), 0);
    assert_eq!(collector.completions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_mid_stream_stops_relay() {
    let server = TtsMockServer::start(TtsMockBehavior {
        chunks: (0..20).map(|i| Bytes::from(format!("chunk-{i}"))).collect(),
        chunk_delay: Duration::from_millis(100),
        fail_with: None,
    })
    .await;
    let tts = provider(&server.base_url);
    let collector = Arc::new(Collector::default());
    let cancel = CancellationToken::new();

    let relay = {
        let collector = collector.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { tts.fetch_and_relay("long answer", collector, cancel).await })
    };

    assert!(wait_for(|| collector.chunk_count() >= 1).await);
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), relay)
        .await
        .expect("relay did not stop after cancel")
        .unwrap();
    assert_eq!(result, Err(TTSError::Cancelled));
    assert!(collector.chunk_count() < 20);
    assert!(collector.errors().is_empty());
    assert_eq!(collector.completions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_sends_nothing() {
    let server = TtsMockServer::start(TtsMockBehavior::default()).await;
    let tts = provider(&server.base_url);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = tts
        .fetch_and_relay("hello", Arc::new(Collector::default()), cancel)
        .await;

    assert_eq!(result, Err(TTSError::Cancelled));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_unreachable_upstream_reports_error() {
    let tts = provider("http://127.0.0.1:9");
    let collector = Arc::new(Collector::default());

    let result = tts
        .fetch_and_relay("hello", collector.clone(), CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(TTSError::ConnectionFailed(_)) | Err(TTSError::Timeout(_))
    ));
    assert_eq!(collector.errors().len(), 1);
    assert_eq!(collector.completions.load(Ordering::SeqCst), 0);
}
