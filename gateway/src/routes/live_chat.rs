//! Live-chat WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::live_chat::live_chat_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the live-chat WebSocket router
///
/// # Endpoint
///
/// `GET /ws/live-chat` - WebSocket upgrade for one voice-chat session
///
/// # Protocol
///
/// Client sends:
/// - Binary frames: captured microphone audio
/// - `{"end_stream": true}` when the user stops speaking
///
/// Server sends:
/// - `{"status": "...", "indicator": bool, "kind": "..."}` on every state change
/// - Binary frames: synthesized speech
pub fn create_live_chat_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/live-chat", get(live_chat_handler))
        .layer(TraceLayer::new_for_http())
}
