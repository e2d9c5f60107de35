//! Extraction of tool invocations from free-form model output.
//!
//! An invocation looks like
//!
//! ```text
//! TOOL_CALL: get_issues_by_status(status="To Do", max_results="10")
//! ```
//!
//! Values are always double-quoted; `\"`, `\\`, `\n`, `\t` and `\r` are the
//! recognised escapes. A malformed invocation is dropped on its own: the
//! scan resumes right after its marker so later invocations still parse.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Literal that introduces an invocation.
pub const MARKER: &str = "TOOL_CALL:";

static HEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TOOL_CALL:\s*([A-Za-z0-9_]+)\s*\(").expect("invocation head regex")
});

/// One invocation found in a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInvocation {
    pub tool_name: String,
    /// Raw (unescaped) argument values keyed by parameter name.
    pub arguments: BTreeMap<String, String>,
    /// Exact text of the invocation, marker included.
    pub source_span: String,
    /// Byte range of `source_span` within the scanned text.
    pub span: Range<usize>,
}

#[derive(Debug, Error, PartialEq, Eq)]
enum ParseError {
    #[error("expected a parameter name at byte {0}")]
    ExpectedName(usize),
    #[error("expected '=' after '{0}'")]
    ExpectedEquals(String),
    #[error("value of '{0}' must be a double-quoted string")]
    UnquotedValue(String),
    #[error("value of '{0}' is not terminated")]
    Unterminated(String),
    #[error("argument '{0}' given twice")]
    DuplicateKey(String),
    #[error("expected ',' or ')' at byte {0}")]
    ExpectedSeparator(usize),
}

/// Lazy, restartable iterator over the invocations in `text`.
pub fn parse_invocations(text: &str) -> Invocations<'_> {
    Invocations { text, pos: 0 }
}

#[derive(Debug, Clone)]
pub struct Invocations<'a> {
    text: &'a str,
    pos: usize,
}

impl Iterator for Invocations<'_> {
    type Item = ParsedInvocation;

    fn next(&mut self) -> Option<ParsedInvocation> {
        while self.pos < self.text.len() {
            let caps = HEAD_RE.captures(&self.text[self.pos..])?;
            let head = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            let start = self.pos + head.start();
            let mut cursor = Cursor {
                src: self.text,
                pos: self.pos + head.end(),
            };

            match scan_arguments(&mut cursor) {
                Ok(arguments) => {
                    self.pos = cursor.pos;
                    return Some(ParsedInvocation {
                        tool_name: name,
                        arguments,
                        source_span: self.text[start..cursor.pos].to_string(),
                        span: start..cursor.pos,
                    });
                }
                Err(err) => {
                    tracing::warn!(tool = %name, "Skipping malformed tool invocation: {}", err);
                    self.pos = start + MARKER.len();
                }
            }
        }
        None
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let src = self.src;
        (self.pos > start).then(|| &src[start..self.pos])
    }
}

/// Parse `k="v", ...)` with the cursor just past the opening parenthesis.
fn scan_arguments(cursor: &mut Cursor<'_>) -> Result<BTreeMap<String, String>, ParseError> {
    let mut arguments = BTreeMap::new();
    cursor.skip_ws();
    if cursor.eat(')') {
        return Ok(arguments);
    }

    loop {
        let key = cursor
            .ident()
            .ok_or(ParseError::ExpectedName(cursor.pos))?
            .to_string();
        cursor.skip_ws();
        if !cursor.eat('=') {
            return Err(ParseError::ExpectedEquals(key));
        }
        cursor.skip_ws();
        if !cursor.eat('"') {
            return Err(ParseError::UnquotedValue(key));
        }
        let value = scan_string(cursor).ok_or_else(|| ParseError::Unterminated(key.clone()))?;
        if arguments.insert(key.clone(), value).is_some() {
            return Err(ParseError::DuplicateKey(key));
        }

        cursor.skip_ws();
        if cursor.eat(')') {
            return Ok(arguments);
        }
        if !cursor.eat(',') {
            return Err(ParseError::ExpectedSeparator(cursor.pos));
        }
        cursor.skip_ws();
        // trailing comma
        if cursor.eat(')') {
            return Ok(arguments);
        }
    }
}

/// Body of a quoted string, cursor just past the opening quote.
fn scan_string(cursor: &mut Cursor<'_>) -> Option<String> {
    let mut value = String::new();
    loop {
        match cursor.bump()? {
            '"' => return Some(value),
            '\\' => match cursor.bump()? {
                '"' => value.push('"'),
                '\\' => value.push('\\'),
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                other => {
                    value.push('\\');
                    value.push(other);
                }
            },
            c => value.push(c),
        }
    }
}
