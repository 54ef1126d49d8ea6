//! Message types passed between pipeline stages and to observers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of speech handed to the delivery queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpokenUnit {
    /// A complete sentence (or the flushed tail) of model text.
    Sentence(String),
    /// The speech-sanitized result of one tool invocation.
    ToolResult(String),
}

impl SpokenUnit {
    /// The text to synthesize.
    pub fn text(&self) -> &str {
        match self {
            Self::Sentence(text) | Self::ToolResult(text) => text,
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult(_))
    }
}

/// Assistant states announced to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantState {
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl AssistantState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        }
    }
}

impl std::fmt::Display for AssistantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer message: `{"state": ..., "data": {...}, "audio_chunk": [...]?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub state: AssistantState,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_chunk: Option<Vec<f32>>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl StateMessage {
    /// A bare state change with empty data.
    pub fn state(state: AssistantState) -> Self {
        Self {
            state,
            data: empty_object(),
            audio_chunk: None,
        }
    }

    /// `speaking` announcement carrying the unit text.
    pub fn speaking(text: &str) -> Self {
        Self {
            state: AssistantState::Speaking,
            data: serde_json::json!({ "response": text }),
            audio_chunk: None,
        }
    }

    /// `speaking` message carrying one synthesized audio buffer.
    pub fn audio(samples: Vec<f32>) -> Self {
        Self {
            state: AssistantState::Speaking,
            data: serde_json::json!({ "response": "" }),
            audio_chunk: Some(samples),
        }
    }
}
