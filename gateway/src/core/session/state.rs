use std::fmt;

/// Lifecycle of one client session.
///
/// ```text
/// Idle ──audio──▶ Listening ──end_stream──▶ Thinking ──final──▶ Speaking ──done──▶ Idle
///   any ──client disconnect / idle timeout──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No STT connection open
    Idle,
    /// STT open, audio flowing
    Listening,
    /// End of stream received, waiting for the final transcript
    Thinking,
    /// Relaying synthesized audio
    Speaking,
    /// Terminal
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Thinking => "thinking",
            SessionState::Speaking => "speaking",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnected,
    IdleTimeout,
}
