//! Restricted literal parser for tool-code arguments.
//!
//! Accepts Python-literal syntax only: quoted strings (with escapes, `r`/`u`
//! prefixes, triple quotes, and implicit concatenation), integers and floats,
//! `True`/`False`/`None` (plus the JSON spellings), lists, tuples, sets, and
//! dicts with scalar keys. Nothing is ever evaluated: names, calls, operators
//! and attribute access are rejected. Values are produced as
//! [`serde_json::Value`] so tools receive the same argument shape they would
//! get from a JSON tool call.

use serde_json::{Map, Number, Value};

use super::error::ToolError;

/// Nesting limit for lists/dicts so hostile input cannot exhaust the stack.
const MAX_DEPTH: usize = 64;

/// Parse `src` as exactly one literal.
///
/// # Errors
///
/// Returns [`ToolError::Parse`] when `src` is not a single literal.
pub fn parse_literal(src: &str) -> Result<Value, ToolError> {
    let mut cursor = Cursor::new(src);
    cursor.skip_ws();
    let value = cursor.parse_value()?;
    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(cursor.error("unexpected trailing text"));
    }
    Ok(value)
}

/// Render `value` in the literal syntax accepted by [`parse_literal`].
///
/// Used to turn structured tool calls from a backend into tool-code lines.
pub fn to_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_owned(),
        Value::Bool(true) => "True".to_owned(),
        Value::Bool(false) => "False".to_owned(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(to_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), to_literal(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Character cursor shared by the literal and call parsers.
pub(crate) struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
        }
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    pub(crate) fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub(crate) fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    pub(crate) fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub(crate) fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn reset(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub(crate) fn error(&self, what: &str) -> ToolError {
        ToolError::Parse(format!("{what} at column {}", self.pos + 1))
    }

    /// Parse an identifier (`[A-Za-z_][A-Za-z0-9_]*`), or `None` without consuming.
    pub(crate) fn parse_ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let mut end = 0;
        for (i, c) in rest.char_indices() {
            let ok = if i == 0 {
                c.is_ascii_alphabetic() || c == '_'
            } else {
                c.is_ascii_alphanumeric() || c == '_'
            };
            if !ok {
                break;
            }
            end = i + c.len_utf8();
        }
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(&rest[..end])
    }

    /// Parse one literal value at the cursor.
    pub(crate) fn parse_value(&mut self) -> Result<Value, ToolError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("expected a literal value")),
            Some('[') => self.nested(|c| c.parse_sequence('[', ']').map(Value::Array)),
            Some('(') => self.nested(Self::parse_parenthesized),
            Some('{') => self.nested(Self::parse_brace),
            Some('"' | '\'') => self.parse_strings(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.parse_word(),
            Some(c) => Err(self.error(&format!("unexpected character '{c}'"))),
        }
    }

    fn nested(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<Value, ToolError>,
    ) -> Result<Value, ToolError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("literal nested too deeply"));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Keywords, or a prefixed string such as `r"..."`.
    fn parse_word(&mut self) -> Result<Value, ToolError> {
        let start = self.pos;
        let Some(word) = self.parse_ident() else {
            return Err(self.error("expected a literal value"));
        };
        if matches!(self.peek(), Some('"' | '\'')) {
            return match word {
                "r" | "R" | "u" | "U" => {
                    self.reset(start);
                    self.parse_strings()
                }
                _ => Err(self.error(&format!("unsupported string prefix '{word}'"))),
            };
        }
        match word {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            other => Err(ToolError::Parse(format!(
                "'{other}' is not a literal (names and expressions are not allowed)"
            ))),
        }
    }

    /// One or more adjacent string literals, concatenated.
    fn parse_strings(&mut self) -> Result<Value, ToolError> {
        let mut out = self.parse_string()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            let next_is_string = match self.peek() {
                Some('"' | '\'') => true,
                Some('r' | 'R' | 'u' | 'U') => matches!(self.peek_nth(1), Some('"' | '\'')),
                _ => false,
            };
            if !next_is_string {
                self.reset(save);
                break;
            }
            out.push_str(&self.parse_string()?);
        }
        Ok(Value::String(out))
    }

    fn parse_string(&mut self) -> Result<String, ToolError> {
        let mut raw = false;
        if let Some(p) = self.peek()
            && matches!(p, 'r' | 'R' | 'u' | 'U')
        {
            raw = matches!(p, 'r' | 'R');
            self.bump();
        }
        let Some(quote) = self.bump() else {
            return Err(self.error("expected a string"));
        };
        let triple = {
            let q2: String = [quote, quote].iter().collect();
            if self.starts_with(&q2) {
                self.pos += 2 * quote.len_utf8();
                true
            } else {
                false
            }
        };
        let closing: String = if triple {
            [quote, quote, quote].iter().collect()
        } else {
            quote.to_string()
        };

        let mut out = String::new();
        loop {
            if self.starts_with(&closing) {
                self.pos += closing.len();
                return Ok(out);
            }
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string"));
            };
            match c {
                '\n' if !triple => return Err(self.error("unterminated string")),
                '\\' if raw => {
                    out.push('\\');
                    if let Some(next) = self.bump() {
                        out.push(next);
                    }
                }
                '\\' => self.parse_escape(&mut out)?,
                other => out.push(other),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), ToolError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape"));
        };
        match c {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            'x' => out.push(self.parse_hex_escape(2)?),
            'u' => out.push(self.parse_hex_escape(4)?),
            'U' => out.push(self.parse_hex_escape(8)?),
            // Unknown escapes keep the backslash, as Python does.
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn parse_hex_escape(&mut self, digits: usize) -> Result<char, ToolError> {
        let rest = self.rest();
        let hex = rest
            .get(..digits)
            .filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| self.error("invalid hex escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex escape"))?;
        let ch = char::from_u32(code).ok_or_else(|| self.error("invalid unicode escape"))?;
        self.pos += digits;
        Ok(ch)
    }

    fn parse_number(&mut self) -> Result<Value, ToolError> {
        let start = self.pos;
        let mut negative = false;
        while let Some(sign) = self.peek().filter(|c| matches!(c, '-' | '+')) {
            if sign == '-' {
                negative = !negative;
            }
            self.bump();
            self.skip_ws();
        }

        let body_start = self.pos;
        let mut is_float = false;
        let mut seen_exp = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' if !is_float && !seen_exp => is_float = true,
                'e' | 'E' if !seen_exp => {
                    seen_exp = true;
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('-' | '+')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }

        let body: String = self.src[body_start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if body.is_empty() || body == "." || !body.chars().any(|c| c.is_ascii_digit()) {
            self.reset(start);
            return Err(self.error("invalid number"));
        }

        if !is_float && let Ok(n) = body.parse::<i64>() {
            return Ok(Value::Number(Number::from(if negative { -n } else { n })));
        }
        let f: f64 = body.parse().map_err(|_| self.error("invalid number"))?;
        let f = if negative { -f } else { f };
        Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| self.error("number is not finite"))
    }

    /// Comma-separated values up to `close`; trailing comma allowed.
    fn parse_sequence(&mut self, open: char, close: char) -> Result<Vec<Value>, ToolError> {
        if !self.eat(open) {
            return Err(self.error(&format!("expected '{open}'")));
        }
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.parse_value()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(close) {
                return Ok(items);
            }
            return Err(self.error(&format!("expected ',' or '{close}'")));
        }
    }

    /// `(x)` is just `x`; `(x,)` and `(x, y)` are tuples (arrays).
    fn parse_parenthesized(&mut self) -> Result<Value, ToolError> {
        self.eat('(');
        self.skip_ws();
        if self.eat(')') {
            return Ok(Value::Array(Vec::new()));
        }
        let first = self.parse_value()?;
        self.skip_ws();
        if self.eat(')') {
            return Ok(first);
        }
        if !self.eat(',') {
            return Err(self.error("expected ',' or ')'"));
        }
        let mut items = vec![first];
        loop {
            self.skip_ws();
            if self.eat(')') {
                return Ok(Value::Array(items));
            }
            items.push(self.parse_value()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                return Ok(Value::Array(items));
            }
            return Err(self.error("expected ',' or ')'"));
        }
    }

    /// Dict, or set (rendered as an array).
    fn parse_brace(&mut self) -> Result<Value, ToolError> {
        self.eat('{');
        self.skip_ws();
        if self.eat('}') {
            return Ok(Value::Object(Map::new()));
        }
        let first = self.parse_value()?;
        self.skip_ws();
        if !self.eat(':') {
            // A set literal: reuse the sequence rules from here on.
            let mut items = vec![first];
            loop {
                self.skip_ws();
                if self.eat('}') {
                    return Ok(Value::Array(items));
                }
                if !self.eat(',') {
                    return Err(self.error("expected ',' or '}'"));
                }
                self.skip_ws();
                if self.eat('}') {
                    return Ok(Value::Array(items));
                }
                items.push(self.parse_value()?);
            }
        }

        let mut map = Map::new();
        let mut key = first;
        loop {
            let value = self.parse_value()?;
            map.insert(self.key_string(key)?, value);
            self.skip_ws();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            if !self.eat(',') {
                return Err(self.error("expected ',' or '}'"));
            }
            self.skip_ws();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            key = self.parse_value()?;
            self.skip_ws();
            if !self.eat(':') {
                return Err(self.error("expected ':' in mapping"));
            }
        }
    }

    fn key_string(&self, key: Value) -> Result<String, ToolError> {
        match key {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(if b { "True" } else { "False" }.to_owned()),
            Value::Null => Ok("None".to_owned()),
            Value::Array(_) | Value::Object(_) => {
                Err(self.error("mapping keys must be strings or numbers"))
            }
        }
    }
}
