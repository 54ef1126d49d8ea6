//! Streaming response processing for one conversational turn.
//!
//! The model's nested stream is drained by two polling loops, each with its
//! own timeout around `next()`. After every fragment the accumulated text is
//! scanned for complete `tool_code` blocks, which are cut out and executed,
//! and then for complete sentences past the examined offset. Everything
//! produced goes straight onto the speech queue, so speaking starts long
//! before the model finishes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::messages::SpokenUnit;
use super::sentences::{sanitize_for_speech, speakable, speakable_final, split_sentences};
use super::speech_queue::SpeechQueue;
use crate::config::LlmConfig;
use crate::llm::prompt::{format_user_prompt, system_instruction};
use crate::llm::{FragmentStream, LanguageModel, ModelRequest, ResponseStream};
use crate::memory::ConversationMemory;
use crate::tools::ToolDispatcher;
use crate::tools::registry::schemas_for_api;
use crate::tools::tool_code::{find_tool_block, parse_block};

/// Spoken when the model cannot be reached at all.
pub const MODEL_UNAVAILABLE_REPLY: &str =
    "Sorry, I couldn't reach my language model. Please try again.";

/// What one turn produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnSummary {
    /// Every unit's text joined with single spaces.
    pub spoken: String,
    /// Number of units queued for speaking.
    pub units: usize,
    /// How many of those units were tool results.
    pub tool_results: usize,
    /// The turn ended because a response or token wait timed out.
    pub timed_out: bool,
}

/// Mutable state of the turn being processed.
#[derive(Debug, Default)]
struct Turn {
    /// Model text received so far, minus executed tool blocks.
    accumulated: String,
    /// Byte offset into the speakable form up to which sentences were emitted.
    examined: usize,
    units: Vec<String>,
    tool_results: usize,
    timed_out: bool,
}

/// Turns an utterance into spoken units.
pub struct ResponseProcessor {
    model: Arc<dyn LanguageModel>,
    memory: Arc<dyn ConversationMemory>,
    tools: Arc<ToolDispatcher>,
    speech: SpeechQueue,
    response_timeout: Duration,
    token_timeout: Duration,
    native_tools: bool,
}

impl ResponseProcessor {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        memory: Arc<dyn ConversationMemory>,
        tools: Arc<ToolDispatcher>,
        speech: SpeechQueue,
        config: &LlmConfig,
    ) -> Self {
        Self {
            model,
            memory,
            tools,
            speech,
            response_timeout: Duration::from_secs(config.response_timeout_secs),
            token_timeout: Duration::from_secs(config.token_timeout_secs),
            native_tools: config.native_tools,
        }
    }

    /// Override the response-level and token-level timeouts.
    pub fn with_timeouts(mut self, response: Duration, token: Duration) -> Self {
        self.response_timeout = response;
        self.token_timeout = token;
        self
    }

    pub fn speech(&self) -> &SpeechQueue {
        &self.speech
    }

    /// Process one finalized utterance.
    ///
    /// Units are queued as they are produced; this returns once the model
    /// stream is exhausted (or timed out) and the exchange is remembered. It
    /// does not wait for the queued units to be spoken.
    pub async fn handle(&self, utterance: &str) -> TurnSummary {
        let context = match self.memory.recall(utterance).await {
            Ok(context) => context,
            Err(e) => {
                warn!("memory recall failed, continuing without context: {e}");
                String::new()
            }
        };

        let mut request =
            ModelRequest::new(system_instruction(), format_user_prompt(utterance, &context));
        if self.native_tools {
            request = request.with_tools(schemas_for_api());
        }

        let mut turn = Turn::default();
        info!(model = self.model.name(), "requesting response");
        match self.model.respond(&request).await {
            Ok(responses) => self.drain_responses(responses, &mut turn).await,
            Err(e) => {
                error!("model request failed: {e}");
                self.emit(&mut turn, SpokenUnit::Sentence(MODEL_UNAVAILABLE_REPLY.to_owned()));
            }
        }
        self.flush(&mut turn);

        let spoken = turn.units.join(" ");
        if let Err(e) = self.memory.remember(utterance, &spoken).await {
            warn!("failed to store exchange in memory: {e}");
        }

        info!(
            units = turn.units.len(),
            tool_results = turn.tool_results,
            timed_out = turn.timed_out,
            "turn complete"
        );
        TurnSummary {
            spoken,
            units: turn.units.len(),
            tool_results: turn.tool_results,
            timed_out: turn.timed_out,
        }
    }

    async fn drain_responses(&self, mut responses: ResponseStream, turn: &mut Turn) {
        loop {
            let fragments = match timeout(self.response_timeout, responses.next()).await {
                Ok(Some(fragments)) => fragments,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "no response from model within {}s, flushing",
                        self.response_timeout.as_secs()
                    );
                    turn.timed_out = true;
                    break;
                }
            };
            self.drain_fragments(fragments, turn).await;
        }
    }

    async fn drain_fragments(&self, mut fragments: FragmentStream, turn: &mut Turn) {
        loop {
            match timeout(self.token_timeout, fragments.next()).await {
                Ok(Some(Ok(fragment))) => {
                    debug!(len = fragment.len(), "model fragment");
                    self.absorb(turn, &fragment).await;
                }
                Ok(Some(Err(e))) => {
                    warn!("model stream failed, ending response: {e}");
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "no token from model within {}s, ending response",
                        self.token_timeout.as_secs()
                    );
                    turn.timed_out = true;
                    break;
                }
            }
        }
    }

    /// Append a fragment, run any completed tool blocks, then emit any
    /// completed sentences.
    async fn absorb(&self, turn: &mut Turn, fragment: &str) {
        turn.accumulated.push_str(fragment);

        while let Some(block) = find_tool_block(&turn.accumulated) {
            // Text written before the block is spoken before its results.
            let before = turn.accumulated[..block.range.start].to_owned();
            self.emit_sentences(turn, &before, true);
            turn.accumulated.replace_range(block.range, "");

            for call in parse_block(&block.body) {
                let result = self.tools.execute_call_blocking(call).await;
                let result = sanitize_for_speech(&result);
                if !result.is_empty() {
                    self.emit(turn, SpokenUnit::ToolResult(result));
                }
            }
        }

        let text = turn.accumulated.clone();
        self.emit_sentences(turn, &text, false);
    }

    /// Emit complete sentences of `raw` past the examined offset.
    ///
    /// With `ends_here`, the end of `raw` counts as whitespace, so a final
    /// terminal punctuation mark closes the last sentence.
    fn emit_sentences(&self, turn: &mut Turn, raw: &str, ends_here: bool) {
        let mut snapshot = speakable(raw).text;
        let visible_len = snapshot.len();
        if ends_here {
            snapshot.push(' ');
        }
        let pending = suffix_from(&snapshot, turn.examined);
        let (sentences, tail) = split_sentences(pending);
        // The padding space is not part of the text that follows.
        turn.examined = (snapshot.len() - pending.len() + tail).min(visible_len);
        for sentence in sentences {
            self.emit(turn, SpokenUnit::Sentence(sentence));
        }
    }

    /// Speak whatever is left after the stream ends.
    fn flush(&self, turn: &mut Turn) {
        let snapshot = speakable_final(&turn.accumulated);
        if snapshot.open_fence {
            warn!("dropping unterminated code fence at end of turn");
        }
        let tail = suffix_from(&snapshot.text, turn.examined).trim().to_owned();
        turn.examined = snapshot.text.len();
        if !tail.is_empty() {
            self.emit(turn, SpokenUnit::Sentence(tail));
        }
    }

    fn emit(&self, turn: &mut Turn, unit: SpokenUnit) {
        if unit.is_tool_result() {
            turn.tool_results += 1;
        }
        turn.units.push(unit.text().to_owned());
        if let Err(e) = self.speech.enqueue(unit) {
            warn!("could not queue speech: {e}");
        }
    }
}

/// `text` from `offset`, moved back to the nearest char boundary.
fn suffix_from(text: &str, offset: usize) -> &str {
    if offset >= text.len() {
        return "";
    }
    let mut at = offset;
    while !text.is_char_boundary(at) {
        at -= 1;
    }
    &text[at..]
}
