//! Conversation session: listen, think, speak, repeat.
//!
//! States are broadcast to observers as they change. `speaking` is not
//! announced here; the speech queue announces it per unit with the unit
//! text. The loop waits for all speech of a turn before listening again, so
//! only one turn's speech is ever in flight.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::messages::{AssistantState, SpokenUnit};
use super::processor::ResponseProcessor;
use crate::config::ConversationConfig;
use crate::error::{ElysiaError, Result};
use crate::observers::ObserverHub;
use crate::stt::SpeechCapture;

/// Drives turns until an exit phrase, cancellation, or a capture failure.
pub struct TurnLoop {
    capture: Arc<dyn SpeechCapture>,
    observers: Arc<ObserverHub>,
    processor: Arc<ResponseProcessor>,
    conversation: ConversationConfig,
}

impl TurnLoop {
    pub fn new(
        capture: Arc<dyn SpeechCapture>,
        observers: Arc<ObserverHub>,
        processor: Arc<ResponseProcessor>,
        conversation: ConversationConfig,
    ) -> Self {
        Self {
            capture,
            observers,
            processor,
            conversation,
        }
    }

    /// Run one session, returning the number of completed turns.
    ///
    /// # Errors
    ///
    /// A capture failure ends the session with an error; observers are left
    /// in the `idle` state.
    pub async fn run(&self, cancel: CancellationToken) -> Result<usize> {
        let speech = self.processor.speech();
        let mut turns = 0usize;
        self.observers.announce(AssistantState::Idle);
        info!("conversation session started");

        loop {
            self.observers.announce(AssistantState::Listening);
            let capture = Arc::clone(&self.capture);
            let heard = tokio::select! {
                () = cancel.cancelled() => break,
                heard = tokio::task::spawn_blocking(move || capture.listen()) => heard,
            };
            let heard = match heard {
                Ok(Ok(heard)) => heard,
                Ok(Err(e)) => return Err(self.abort(e)),
                Err(e) => {
                    let e = ElysiaError::Pipeline(format!("capture task failed: {e}"));
                    return Err(self.abort(e));
                }
            };
            let Some(utterance) = heard.map(|u| u.trim().to_owned()).filter(|u| !u.is_empty())
            else {
                continue;
            };
            info!("user: {utterance}");

            if is_exit_phrase(&utterance, &self.conversation.exit_phrases) {
                info!("exit phrase heard, ending session");
                let farewell = self.conversation.farewell.trim();
                if !farewell.is_empty()
                    && let Err(e) = speech.enqueue(SpokenUnit::Sentence(farewell.to_owned()))
                {
                    error!("could not queue farewell: {e}");
                }
                speech.join().await;
                break;
            }

            self.observers.announce(AssistantState::Thinking);
            self.processor.handle(&utterance).await;
            speech.join().await;
            turns += 1;
        }

        self.observers.announce(AssistantState::Idle);
        info!(turns, "conversation session ended");
        Ok(turns)
    }

    fn abort(&self, e: ElysiaError) -> ElysiaError {
        error!("speech capture failed, ending session: {e}");
        self.observers.announce(AssistantState::Idle);
        e
    }
}

/// Whether `utterance` is one of `phrases`, ignoring case, surrounding
/// whitespace, and trailing punctuation.
pub fn is_exit_phrase(utterance: &str, phrases: &[String]) -> bool {
    let normalized = normalize(utterance);
    !normalized.is_empty() && phrases.iter().any(|p| normalize(p) == normalized)
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase()
}
