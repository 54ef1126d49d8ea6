//! Language model collaborator.
//!
//! A model answers one [`ModelRequest`] with a nested stream: an outer stream
//! of responses, each an inner stream of text fragments. The response
//! processor drains both levels with independent timeouts, so a backend only
//! has to yield fragments as they arrive.

pub mod ollama;
pub mod prompt;
mod think;

pub use ollama::OllamaModel;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;

/// Text fragments of a single response, in generation order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Responses produced for one request.
pub type ResponseStream = Pin<Box<dyn Stream<Item = FragmentStream> + Send>>;

/// One turn's request to the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRequest {
    /// System instruction, including the tool listing.
    pub system: String,
    /// Formatted user prompt (memory context plus utterance).
    pub prompt: String,
    /// Function schemas for backends with native tool calling. Empty when
    /// tools are only described in the system instruction.
    pub tools: Vec<serde_json::Value>,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            tools: Vec::new(),
        }
    }

    /// Attach native tool schemas.
    pub fn with_tools(mut self, tools: Vec<serde_json::Value>) -> Self {
        self.tools = tools;
        self
    }
}

/// Streaming language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Start answering `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started. Failures after
    /// streaming has begun are reported as `Err` fragments.
    async fn respond(&self, request: &ModelRequest) -> Result<ResponseStream>;
}
