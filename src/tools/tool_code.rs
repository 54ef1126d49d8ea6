//! Fenced `tool_code` blocks embedded in model text.
//!
//! A block opens with `` ```tool_code `` and closes at the next `` ``` ``.
//! Each non-blank, non-comment line of the body is one call of the form
//! `name(keyword=literal, ...)`.

use std::ops::Range;

use serde_json::{Map, Value};

use super::error::ToolError;
use super::literal::Cursor;

/// Opening marker of a tool block.
pub const TOOL_FENCE_OPEN: &str = "```tool_code";

/// Closing marker (any triple backtick).
pub const FENCE: &str = "```";

/// A complete tool block located inside a text buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBlock {
    /// Byte range of the whole block, fences included.
    pub range: Range<usize>,
    /// Text between the opener and the closing fence.
    pub body: String,
}

/// A parsed call line: tool name plus keyword arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub kwargs: Map<String, Value>,
}

/// Byte offset of the first `tool_code` opener in `text`, if any.
pub fn find_opener(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = text[from..].find(TOOL_FENCE_OPEN) {
        let at = from + rel;
        let after = at + TOOL_FENCE_OPEN.len();
        // `tool_codex` is some other language tag.
        match text[after..].chars().next() {
            Some(c) if c.is_ascii_alphanumeric() || c == '_' => from = after,
            _ => return Some(at),
        }
    }
    None
}

/// Find the first complete tool block in `text`.
///
/// Returns `None` when there is no opener, or the opener is not yet closed.
pub fn find_tool_block(text: &str) -> Option<ToolBlock> {
    let start = find_opener(text)?;
    let body_start = start + TOOL_FENCE_OPEN.len();
    let close_rel = text[body_start..].find(FENCE)?;
    let body_end = body_start + close_rel;
    Some(ToolBlock {
        range: start..body_end + FENCE.len(),
        body: text[body_start..body_end].to_owned(),
    })
}

/// Parse a block body into per-line call results, in line order.
///
/// Blank lines and `#` comments produce nothing; every other line yields
/// exactly one entry.
pub fn parse_block(body: &str) -> Vec<Result<ToolCall, ToolError>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_call)
        .collect()
}

/// Parse a single `name(kw=literal, ...)` line.
///
/// # Errors
///
/// Returns [`ToolError::Parse`] for anything other than one call with
/// keyword-only literal arguments.
pub fn parse_call(line: &str) -> Result<ToolCall, ToolError> {
    let line = line.trim();
    let mut cursor = Cursor::new(line);

    let name = cursor
        .parse_ident()
        .ok_or_else(|| ToolError::Parse(format!("unsupported line: {line}")))?
        .to_owned();
    cursor.skip_ws();
    if cursor.peek() == Some('.') {
        return Err(ToolError::Parse(format!(
            "attribute access is not allowed: {line}"
        )));
    }
    if !cursor.eat('(') {
        return Err(ToolError::Parse(format!("unsupported line: {line}")));
    }

    let mut kwargs = Map::new();
    loop {
        cursor.skip_ws();
        if cursor.eat(')') {
            break;
        }
        if cursor.starts_with("**") {
            return Err(ToolError::Parse(format!(
                "'**' argument unpacking is not allowed in {name}()"
            )));
        }
        if cursor.starts_with("*") {
            return Err(ToolError::Parse(format!(
                "'*' argument unpacking is not allowed in {name}()"
            )));
        }

        let key = keyword(&mut cursor).ok_or_else(|| {
            ToolError::Parse(format!(
                "positional arguments are not allowed in {name}(); use keyword=value"
            ))
        })?;
        let value = cursor.parse_value()?;
        if kwargs.contains_key(&key) {
            return Err(ToolError::Parse(format!(
                "duplicate keyword argument '{key}' in {name}()"
            )));
        }
        kwargs.insert(key, value);

        cursor.skip_ws();
        if cursor.eat(',') {
            continue;
        }
        if cursor.eat(')') {
            break;
        }
        return Err(cursor.error("expected ',' or ')'"));
    }

    cursor.skip_ws();
    cursor.eat(';');
    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(cursor.error("unexpected text after call"));
    }
    Ok(ToolCall { name, kwargs })
}

/// Consume `ident =` (but not `==`) and return the identifier.
/// Leaves the cursor untouched when no keyword is present.
fn keyword(cursor: &mut Cursor<'_>) -> Option<String> {
    let start = cursor.position();
    let ident = cursor.parse_ident().map(str::to_owned);
    cursor.skip_ws();
    match ident {
        Some(ident) if cursor.starts_with("=") && !cursor.starts_with("==") => {
            cursor.eat('=');
            Some(ident)
        }
        _ => {
            cursor.reset(start);
            None
        }
    }
}
