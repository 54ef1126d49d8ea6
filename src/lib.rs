//! Elysia: a local voice assistant's turn core.
//!
//! One conversational turn runs as:
//! capture → memory recall → model stream → tool blocks / sentences → speech
//!
//! # Architecture
//!
//! - **Capture** ([`stt`]): blocking source of finished utterances
//! - **Model** ([`llm`]): nested stream of responses and text fragments
//! - **Processor** ([`pipeline::processor`]): cuts `tool_code` blocks out of
//!   the stream, runs them in the [`sandbox`], and splits the rest into
//!   sentences
//! - **Speech queue** ([`pipeline::speech_queue`]): single worker that
//!   synthesizes units in order via [`tts`]
//! - **Observers** ([`observers`], [`transport`]): state and audio fan-out
//!   to WebSocket clients

pub mod config;
pub mod error;
pub mod llm;
pub mod macros;
pub mod memory;
pub mod observers;
pub mod pipeline;
pub mod sandbox;
pub mod stt;
pub mod tools;
pub mod transport;
pub mod tts;

pub use config::ElysiaConfig;
pub use error::{ElysiaError, Result};
pub use observers::ObserverHub;
pub use pipeline::{ResponseProcessor, SpeechQueue, TurnLoop};
pub use transport::Transport;
