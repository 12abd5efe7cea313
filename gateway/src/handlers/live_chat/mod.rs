mod handler;

pub use handler::live_chat_handler;
