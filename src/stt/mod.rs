//! Speech capture.
//!
//! The turn loop only needs finished utterances, so capture is a single
//! blocking call that returns once the speaker has finished. Engines that
//! stream audio and run recognition sit behind this trait.

use std::io::{BufRead, Write};

use crate::error::{ElysiaError, Result};

/// Blocking source of finalized utterances.
pub trait SpeechCapture: Send + Sync {
    /// Wait for the next utterance.
    ///
    /// `Ok(None)` (or an empty string) means nothing usable was heard and the
    /// caller should listen again.
    ///
    /// # Errors
    ///
    /// A capture failure is fatal to the session.
    fn listen(&self) -> Result<Option<String>>;
}

/// Reads utterances as lines from standard input.
///
/// Stands in for a microphone recognizer when running headless.
#[derive(Debug, Default)]
pub struct StdinCapture {
    prompt: Option<String>,
}

impl StdinCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print `prompt` to stderr before each read.
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
        }
    }
}

impl SpeechCapture for StdinCapture {
    fn listen(&self) -> Result<Option<String>> {
        if let Some(prompt) = &self.prompt {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "{prompt}");
            let _ = stderr.flush();
        }
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(ElysiaError::Stt("input closed".into()));
        }
        let text = line.trim();
        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text.to_owned()))
        }
    }
}
