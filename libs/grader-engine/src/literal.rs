//! Literal values found in fixture declarations.
//!
//! Fixtures are Python source, so values use Python literal syntax. JSON
//! spellings of the scalar keywords (`true`, `false`, `null`) are accepted as
//! well and normalized, which is what lets a value be re-emitted as a Python
//! literal inside a harness regardless of how the fixture author wrote it.
//! Anything beyond plain literals (constructor calls, names, arithmetic) is
//! rejected instead of being guessed at.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    /// Integer text without `_` separators; arbitrary size
    Int(String),
    Float(String),
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

impl Literal {
    /// Parse a complete literal; trailing non-whitespace is an error
    pub fn parse(text: &str) -> Result<Literal, LiteralError> {
        let mut parser = LiteralParser::new(text, 0);
        let value = parser.parse_value()?;
        parser.skip_trivia();
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(value)
    }

    /// Python source form, suitable for binding in a generated program
    pub fn to_python(&self) -> String {
        let mut out = String::new();
        self.write_python(&mut out);
        out
    }

    fn write_python(&self, out: &mut String) {
        match self {
            Literal::None => out.push_str("None"),
            Literal::Bool(true) => out.push_str("True"),
            Literal::Bool(false) => out.push_str("False"),
            Literal::Int(text) | Literal::Float(text) => out.push_str(text),
            Literal::Str(s) => write_python_str(s, out),
            Literal::List(items) => {
                out.push('[');
                write_items(items, out);
                out.push(']');
            }
            Literal::Tuple(items) => {
                out.push('(');
                write_items(items, out);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Literal::Dict(pairs) => {
                out.push('{');
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_python(out);
                    out.push_str(": ");
                    v.write_python(out);
                }
                out.push('}');
            }
        }
    }
}

/// Display mirrors Python's `str()`: bare text for strings, repr otherwise
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => f.write_str(s),
            other => f.write_str(&other.to_python()),
        }
    }
}

fn write_items(items: &[Literal], out: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_python(out);
    }
}

fn write_python_str(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

/// Recursive-descent parser over a Python literal subset.
///
/// Works on a char buffer; offsets reported in errors are char offsets.
pub struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    pub fn new(text: &str, start: usize) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: start,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    pub fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    /// Skip whitespace, newlines, comments and line continuations
    pub fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if c == '\\' && matches!(self.peek_at(1), Some('\n') | Some('\r')) {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    /// Consume `expected` after trivia, or fail
    pub fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
        self.skip_trivia();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", expected)))
        }
    }

    pub fn parse_value(&mut self) -> Result<Literal, LiteralError> {
        self.skip_trivia();
        let c = self.peek().ok_or_else(|| self.error("unexpected end of input"))?;
        match c {
            '[' => {
                self.pos += 1;
                let items = self.parse_sequence(']')?.0;
                Ok(Literal::List(items))
            }
            '(' => {
                self.pos += 1;
                let (mut items, trailing_comma) = self.parse_sequence(')')?;
                if items.len() == 1 && !trailing_comma {
                    // parenthesized expression, not a tuple
                    Ok(items.remove(0))
                } else {
                    Ok(Literal::Tuple(items))
                }
            }
            '{' => {
                self.pos += 1;
                self.parse_dict()
            }
            '-' | '+' => {
                self.pos += 1;
                self.skip_trivia();
                match self.parse_value()? {
                    Literal::Int(text) if c == '-' => Ok(Literal::Int(negate(&text))),
                    Literal::Float(text) if c == '-' => Ok(Literal::Float(negate(&text))),
                    n @ (Literal::Int(_) | Literal::Float(_)) => Ok(n),
                    _ => Err(self.error("unary sign applied to a non-number")),
                }
            }
            c if c.is_ascii_digit() => self.parse_number(),
            '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.parse_number(),
            '\'' | '"' => self.parse_strings(),
            c if c.is_alphabetic() || c == '_' => self.parse_word(),
            other => Err(self.error(format!("unexpected character '{}'", other))),
        }
    }

    /// Items up to `close`; returns whether the last item had a trailing comma
    fn parse_sequence(&mut self, close: char) -> Result<(Vec<Literal>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_trivia();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok((items, trailing_comma));
            }
            items.push(self.parse_value()?);
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    trailing_comma = true;
                }
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok((items, false));
                }
                _ => return Err(self.error(format!("expected ',' or '{}'", close))),
            }
        }
    }

    fn parse_dict(&mut self) -> Result<Literal, LiteralError> {
        let mut pairs = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Literal::Dict(pairs));
            }
            let key = self.parse_value()?;
            self.skip_trivia();
            if self.peek() != Some(':') {
                return Err(self.error("set literals are not supported; expected ':'"));
            }
            self.pos += 1;
            let value = self.parse_value()?;
            pairs.push((key, value));
            self.skip_trivia();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {
                    self.pos += 1;
                    return Ok(Literal::Dict(pairs));
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                self.pos += 1;
            }
            let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
            return parse_radix_int(&text).ok_or_else(|| LiteralError {
                offset: start,
                message: format!("invalid integer literal '{}'", text),
            });
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else if matches!(c, 'e' | 'E') {
                is_float = true;
                self.pos += 1;
                if matches!(self.peek(), Some('+' | '-')) {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            return Err(self.error("complex literals are not supported"));
        }

        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        if is_float {
            let normalized = if text.starts_with('.') { format!("0{}", text) } else { text };
            if normalized.parse::<f64>().is_err() {
                return Err(LiteralError {
                    offset: start,
                    message: format!("invalid float literal '{}'", normalized),
                });
            }
            Ok(Literal::Float(normalized))
        } else {
            let trimmed = text.trim_start_matches('0');
            Ok(Literal::Int(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }))
        }
    }

    fn parse_word(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(), Some('\'' | '"')) {
            let prefix = word.to_ascii_lowercase();
            if prefix == "r" || prefix == "u" {
                self.pos = start;
                return self.parse_strings();
            }
            return Err(LiteralError {
                offset: start,
                message: format!("string prefix '{}' is not supported", word),
            });
        }

        match word.as_str() {
            "None" | "null" => Ok(Literal::None),
            "True" | "true" => Ok(Literal::Bool(true)),
            "False" | "false" => Ok(Literal::Bool(false)),
            _ => Err(LiteralError {
                offset: start,
                message: format!("'{}' is not a literal", word),
            }),
        }
    }

    /// One or more adjacent string literals, concatenated
    fn parse_strings(&mut self) -> Result<Literal, LiteralError> {
        let mut value = self.parse_one_string()?;
        loop {
            let save = self.pos;
            self.skip_trivia();
            let next_is_string = match self.peek() {
                Some('\'' | '"') => true,
                Some('r' | 'R' | 'u' | 'U') => matches!(self.peek_at(1), Some('\'' | '"')),
                _ => false,
            };
            if !next_is_string {
                self.pos = save;
                return Ok(Literal::Str(value));
            }
            value.push_str(&self.parse_one_string()?);
        }
    }

    fn parse_one_string(&mut self) -> Result<String, LiteralError> {
        let mut raw = false;
        while let Some(c) = self.peek() {
            match c {
                'r' | 'R' => raw = true,
                'u' | 'U' => {}
                _ => break,
            }
            self.pos += 1;
        }

        let start = self.pos;
        let quote = self.peek().ok_or_else(|| self.error("expected string"))?;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let c = self.peek().ok_or_else(|| LiteralError {
                offset: start,
                message: "unterminated string".to_string(),
            })?;

            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok(out);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(out);
                }
            }
            if c == '\n' && !triple {
                return Err(LiteralError {
                    offset: start,
                    message: "unterminated string".to_string(),
                });
            }

            if c == '\\' {
                let next = self.peek_at(1).ok_or_else(|| self.error("dangling escape"))?;
                if raw {
                    out.push('\\');
                    out.push(next);
                    self.pos += 2;
                    continue;
                }
                self.pos += 2;
                match next {
                    '\n' => {}
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    '0' => out.push('\0'),
                    'a' => out.push('\x07'),
                    'b' => out.push('\x08'),
                    'f' => out.push('\x0c'),
                    'v' => out.push('\x0b'),
                    'x' => out.push(self.hex_escape(2)?),
                    'u' => out.push(self.hex_escape(4)?),
                    'U' => out.push(self.hex_escape(8)?),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }

            out.push(c);
            self.pos += 1;
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        if self.pos + digits > self.chars.len() {
            return Err(self.error("truncated escape sequence"));
        }
        let text: String = self.chars[self.pos..self.pos + digits].iter().collect();
        let code = u32::from_str_radix(&text, 16).map_err(|_| self.error("invalid escape sequence"))?;
        self.pos += digits;
        char::from_u32(code).ok_or_else(|| self.error("escape is not a valid character"))
    }
}

fn negate(text: &str) -> String {
    match text.strip_prefix('-') {
        Some(rest) => rest.to_string(),
        None if text == "0" => text.to_string(),
        None => format!("-{}", text),
    }
}

fn parse_radix_int(text: &str) -> Option<Literal> {
    let (radix, digits) = match &text[..2] {
        "0x" | "0X" => (16, &text[2..]),
        "0o" | "0O" => (8, &text[2..]),
        _ => (2, &text[2..]),
    };
    // Wider values would need bignum arithmetic; keep them out rather than truncate
    i128::from_str_radix(digits, radix)
        .ok()
        .map(|n| Literal::Int(n.to_string()))
}
