//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `live_chat` - Live voice-chat WebSocket

pub mod api;
pub mod live_chat;

pub use live_chat::live_chat_handler;
