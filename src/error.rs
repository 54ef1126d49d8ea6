//! Error types for the elysia voice-turn core.

/// Top-level error type for the conversation session.
#[derive(Debug, thiserror::Error)]
pub enum ElysiaError {
    /// Speech capture error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language model request or stream error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Conversation memory storage error.
    #[error("memory error: {0}")]
    Memory(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Turn coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ElysiaError>;
