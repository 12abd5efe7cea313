mod config;
mod provider;

pub use config::ElevenLabsTTSConfig;
pub use provider::ElevenLabsTTS;
