//! Speech synthesis.
//!
//! Synthesis is blocking and produces audio incrementally: engines return a
//! lazy iterator of mono `f32` buffers so the first buffer can be delivered
//! while later ones are still being generated.

use crate::error::Result;

/// Lazily produced audio buffers for one piece of text.
pub type AudioBuffers = Box<dyn Iterator<Item = Result<Vec<f32>>> + Send>;

/// Blocking text-to-speech engine.
pub trait SpeechSynthesizer: Send + Sync {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Start synthesizing `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis cannot start; per-buffer failures are
    /// reported through the iterator.
    fn synthesize(&self, text: &str) -> Result<AudioBuffers>;

    /// Load models ahead of the first utterance.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Text-only synthesizer: produces no audio.
///
/// Observers still receive every `speaking` message with the unit text, so
/// a client can display or speak it itself.
#[derive(Debug, Clone, Copy)]
pub struct SilentSynthesizer {
    sample_rate: u32,
}

impl SilentSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Default for SilentSynthesizer {
    fn default() -> Self {
        Self::new(24_000)
    }
}

impl SpeechSynthesizer for SilentSynthesizer {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&self, _text: &str) -> Result<AudioBuffers> {
        Ok(Box::new(std::iter::empty()))
    }
}
