//! Error type for tool parsing, binding, and execution.
//!
//! Every variant carries a stable spoken kind (see [`ToolError::kind()`]).
//! Tool failures never leave the dispatcher as errors; they are rendered
//! into `ERROR: <kind>: <message>` result strings by [`ToolError::render()`].

/// Errors produced while turning a tool-code line into a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// The line is not a single keyword-only call with literal arguments.
    #[error("parse error: {0}")]
    Parse(String),

    /// No tool or alias with this name exists.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Keyword arguments do not match the tool's declared shape.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The resolved path would leave the sandbox root.
    #[error("sandbox violation: {0}")]
    SandboxViolation(String),

    /// A file, directory, or macro was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Filesystem failure inside the sandbox.
    #[error("io error: {0}")]
    Io(String),

    /// Macro store failure (limit reached, invalid name, persistence).
    #[error("macro error: {0}")]
    Macro(String),
}

impl ToolError {
    /// Speech-friendly failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse error",
            Self::UnknownTool(_) => "unknown tool",
            Self::InvalidArguments(_) => "invalid arguments",
            Self::SandboxViolation(_) => "sandbox violation",
            Self::NotFound(_) => "not found",
            Self::Io(_) => "io error",
            Self::Macro(_) => "macro error",
        }
    }

    /// Returns the inner message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Parse(m)
            | Self::UnknownTool(m)
            | Self::InvalidArguments(m)
            | Self::SandboxViolation(m)
            | Self::NotFound(m)
            | Self::Io(m)
            | Self::Macro(m) => m,
        }
    }

    /// Render as an error-tagged result line.
    pub fn render(&self) -> String {
        format!("ERROR: {}: {}", self.kind(), self.message())
    }
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
