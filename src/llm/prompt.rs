//! Prompt assembly.

use crate::tools::registry;
use crate::tools::tool_code::TOOL_FENCE_OPEN;

/// Fixed persona and behaviour rules.
pub const SYSTEM_PROMPT: &str = "\
You are Elysia, a local AI assistant running on the user's machine.
- Use the provided tools to accomplish tasks when appropriate.
- If a tool call fails, explain the error briefly.
- Otherwise, be concise and helpful. Your replies are spoken aloud, so avoid markdown.
- When a task involves reading or writing files, you MUST call the appropriate tool instead of writing pretend code or describing steps.
- When a file path isn't given, default to the workspace directory. You can also use directory hints like 'in workspace' or 'in repo/backend'.";

/// Full system instruction: persona, tool-call syntax, and the tool table.
pub fn system_instruction() -> String {
    format!(
        "{SYSTEM_PROMPT}\n\n\
         To call tools, write a fenced block, one call per line, keyword arguments only:\n\
         {TOOL_FENCE_OPEN}\n\
         create_file(filename='notes.txt', content='hello')\n\
         ```\n\
         Argument values must be literals: quoted strings, numbers, True/False/None, lists, or dicts.\n\
         Each call's result is read to the user.\n\n\
         Available tools:\n{}",
        registry::prompt_listing()
    )
}

/// Combine optional memory context and the utterance into the user prompt.
pub fn format_user_prompt(user_text: &str, memory_text: &str) -> String {
    let mut parts = Vec::with_capacity(2);
    if !memory_text.trim().is_empty() {
        parts.push(format!("Relevant memory:\n{memory_text}"));
    }
    parts.push(format!("User: {user_text}"));
    parts.join("\n\n")
}
