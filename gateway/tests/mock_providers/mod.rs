//! Mock upstream servers for integration tests
//!
//! - `websocket_mock`: streaming speech-to-text over WebSocket (ElevenLabs framing)
//! - `http_mock`: chunked text-to-speech over HTTP (ElevenLabs stream endpoint)
//!
//! Both bind to an ephemeral port on 127.0.0.1 and record what the gateway sent
//! so tests can assert on it.

// Not every test binary uses every helper
#![allow(dead_code)]

use std::time::Duration;

pub mod http_mock;
pub mod websocket_mock;

/// Generous bound for anything a test waits on.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `check` until it holds or [`TEST_TIMEOUT`] elapses.
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
