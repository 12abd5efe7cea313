//! Wire representation of the client-facing live-chat protocol.
//!
//! Payload kind decides the meaning of a frame: binary frames are always audio,
//! text frames are always JSON control messages. Content is never sniffed.
//!
//! Inbound (client → server):
//! - binary: raw audio chunk in the client's capture codec
//! - text: `{"end_stream": true}`
//!
//! Outbound (server → client):
//! - binary: synthesized audio chunk
//! - text: `{"status": "...", "indicator": bool, "kind": "..."}`

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A text frame that is not a JSON object
    #[error("Malformed control message: {0}")]
    MalformedMessage(String),
}

/// Transport-neutral inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Bytes),
    Close,
}

/// A decoded client frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// One chunk of captured audio
    Audio(Bytes),
    /// End-of-utterance sentinel
    EndStream,
    /// The client closed the connection
    Disconnect,
}

/// Known inbound control shape.
#[derive(Debug, Deserialize)]
struct ControlMessage {
    #[serde(default)]
    end_stream: Option<bool>,
}

/// Decode one inbound frame.
///
/// Returns `Ok(None)` for well-formed control messages of an unrecognized shape;
/// those are ignored rather than treated as errors.
pub fn decode_inbound(frame: InboundFrame) -> Result<Option<ClientFrame>, CodecError> {
    match frame {
        InboundFrame::Binary(data) => Ok(Some(ClientFrame::Audio(data))),
        InboundFrame::Close => Ok(Some(ClientFrame::Disconnect)),
        InboundFrame::Text(text) => {
            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| CodecError::MalformedMessage(e.to_string()))?;
            if !value.is_object() {
                return Err(CodecError::MalformedMessage(
                    "control message must be a JSON object".to_string(),
                ));
            }

            let control: ControlMessage = serde_json::from_value(value)
                .map_err(|e| CodecError::MalformedMessage(e.to_string()))?;

            match control.end_stream {
                Some(true) => Ok(Some(ClientFrame::EndStream)),
                _ => Ok(None),
            }
        }
    }
}

/// Closed set of client-visible states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Error,
}

impl StatusKind {
    /// Whether the client should show its activity indicator
    pub fn indicator(self) -> bool {
        matches!(self, StatusKind::Listening | StatusKind::Thinking)
    }

    pub fn default_text(self) -> &'static str {
        match self {
            StatusKind::Idle => "Press and Hold to Speak",
            StatusKind::Listening => "Listening...",
            StatusKind::Thinking => "Thinking...",
            StatusKind::Speaking => "Speaking...",
            StatusKind::Error => "Connection issue, please try again",
        }
    }
}

/// Outbound status control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: String,
    pub indicator: bool,
    pub kind: StatusKind,
}

impl StatusMessage {
    /// Status with the default display text for `kind`
    pub fn new(kind: StatusKind) -> Self {
        Self::with_text(kind, kind.default_text())
    }

    /// Status with custom display text; `indicator` is still derived from `kind`
    pub fn with_text(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            status: text.into(),
            indicator: kind.indicator(),
            kind,
        }
    }
}

/// Serialize a status message for a text frame.
pub fn encode_status(message: &StatusMessage) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(|e| CodecError::MalformedMessage(e.to_string()))
}

/// Frame queued for the client writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Status(StatusMessage),
    Audio(Bytes),
    Close,
}
