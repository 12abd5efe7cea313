//! ElevenLabs streaming speech-to-text integration.
//!
//! - [`config`]: `ElevenLabsSTTConfig`, the credential, endpoint and timeouts
//! - [`messages`]: outgoing handshake/audio/end-of-stream frames and incoming parsing
//! - [`client`]: `ElevenLabsSTT`, the connection and its receive loop
//!
//! Audio is sent base64-encoded inside JSON (`{"audio": "..."}`); the first frame on
//! every connection is `{"xi_api_key": "...", "model_id": "..."}`.

mod client;
mod config;
mod messages;


pub use client::{ElevenLabsSTT, ElevenLabsSTTFactory};
pub use config::{AUDIO_CHANNEL_CAPACITY, ElevenLabsSTTConfig};
pub use messages::{AudioMessage, AuthMessage, ElevenLabsMessage, EndStreamMessage};
