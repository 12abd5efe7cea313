pub mod channel;
pub mod codec;
pub mod session;
pub mod stt;
pub mod tts;

// Re-export commonly used types for convenience
pub use channel::{AudioPath, ChannelError, ClientSender};
pub use codec::{
    ClientFrame, CodecError, InboundFrame, OutboundFrame, StatusKind, StatusMessage,
    decode_inbound, encode_status,
};
pub use session::{CloseReason, Session, SessionConfig, SessionError, SessionState};
pub use stt::{
    BaseSTT, STTConnectionState, STTError, STTEvent, STTEventKind, STTFactory, STTResult,
};
pub use tts::{AudioCallback, BaseTTS, TTSError, TTSResult};
