//! WebSocket message types for the ElevenLabs streaming STT API.
//!
//! - **Outgoing**: [`AuthMessage`] (first frame), [`AudioMessage`] (base64 audio),
//!   [`EndStreamMessage`] (flush request)
//! - **Incoming**: [`ElevenLabsMessage`], either a transcript, an error or
//!   something this client does not use

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::core::stt::base::TranscriptEvent;

// =============================================================================
// Outgoing Messages
// =============================================================================

/// Authentication and configuration handshake.
#[derive(Debug, Serialize)]
pub struct AuthMessage<'a> {
    pub xi_api_key: &'a str,
    pub model_id: &'a str,
}

/// One audio frame, base64 encoded.
#[derive(Debug, Serialize)]
pub struct AudioMessage {
    pub audio: String,
}

impl AudioMessage {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            audio: STANDARD.encode(data),
        }
    }
}

/// End-of-stream sentinel.
#[derive(Debug, Serialize)]
pub struct EndStreamMessage {
    pub end_stream: bool,
}

impl Default for EndStreamMessage {
    fn default() -> Self {
        Self { end_stream: true }
    }
}

// =============================================================================
// Incoming Messages
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    is_final: Option<bool>,
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Parsed upstream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevenLabsMessage {
    Transcript(TranscriptEvent),
    /// The upstream reported a failure (including a rejected credential)
    Error(String),
    /// Valid JSON of a shape we do not use
    Unknown(String),
}

impl ElevenLabsMessage {
    /// Parse a text frame.
    ///
    /// Invalid JSON is an error; unrecognized objects are `Unknown`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Ok(Self::Unknown(text.to_string()));
        }
        let raw: RawMessage = serde_json::from_value(value)?;

        let is_error_type = raw
            .message_type
            .as_deref()
            .is_some_and(|t| t == "error" || t.ends_with("_error"));

        if let Some(error) = raw.error {
            let detail = match error {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return Ok(Self::Error(detail));
        }
        if is_error_type {
            return Ok(Self::Error(
                raw.message.unwrap_or_else(|| "unspecified upstream error".to_string()),
            ));
        }

        match raw.text {
            Some(text) => Ok(Self::Transcript(TranscriptEvent {
                text,
                is_final: raw.is_final.unwrap_or(false),
            })),
            None => Ok(Self::Unknown(text.to_string())),
        }
    }
}
