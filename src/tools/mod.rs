//! Tool-code parsing, the fixed tool table, and dispatch.
//!
//! The model asks for tools by writing fenced `tool_code` blocks into its
//! text. [`tool_code`] finds and parses those blocks, [`literal`] parses the
//! argument values without evaluating anything, [`registry`] binds calls to
//! the fixed tool table, and [`dispatch`] runs them against the sandbox and
//! macro store.

pub mod dispatch;
pub mod error;
pub mod literal;
pub mod registry;
pub mod tool_code;

pub use dispatch::{MAX_MACRO_DEPTH, ToolDispatcher};
pub use error::ToolError;
pub use registry::{ToolInvocation, ToolKind, ToolSpec, TOOL_SPECS};
pub use tool_code::{ToolCall, find_tool_block, parse_block, parse_call};
