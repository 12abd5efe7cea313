mod base;
pub mod elevenlabs;

pub use base::{
    BaseSTT, STTConnectionState, STTError, STTEvent, STTEventKind, STTFactory, STTResult,
    TranscriptAssembler, TranscriptEvent,
};

pub use elevenlabs::{ElevenLabsSTT, ElevenLabsSTTConfig, ElevenLabsSTTFactory};
