mod base;
pub mod elevenlabs;

pub use base::{AudioCallback, BaseTTS, TTSError, TTSResult};
pub use elevenlabs::{ElevenLabsTTS, ElevenLabsTTSConfig};
