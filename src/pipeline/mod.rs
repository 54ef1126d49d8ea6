//! Turn pipeline: response processing, speech delivery, and the session loop.

pub mod messages;
pub mod processor;
pub mod sentences;
pub mod speech_queue;
pub mod turn;

pub use messages::{AssistantState, SpokenUnit, StateMessage};
pub use processor::{ResponseProcessor, TurnSummary};
pub use speech_queue::SpeechQueue;
pub use turn::TurnLoop;
