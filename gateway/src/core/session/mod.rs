//! Session orchestration.
//!
//! A [`Session`] is bound to one client connection. It owns at most one STT
//! connection at a time and any number of in-flight TTS relays, and decides when
//! to open, flush and close them based on client frames and upstream events.

mod orchestrator;
mod state;


pub use orchestrator::{Session, SessionConfig, SessionError, TEARDOWN_TIMEOUT};
pub use state::{CloseReason, SessionState};
