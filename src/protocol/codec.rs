use std::fmt::Write as _;

use crate::protocol::constants::{
    MAX_ARRAY_SIZE, MAX_DEPTH, MAX_FIELDS, MAX_JSON_SIZE, MAX_STRING_SIZE,
};
use crate::protocol::error::CodecError;
use crate::protocol::value::{Object, Value};

/// Bounds enforced while parsing untrusted text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_json_size: usize,
    pub max_string_size: usize,
    pub max_fields: usize,
    pub max_array_size: usize,
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_json_size: MAX_JSON_SIZE,
            max_string_size: MAX_STRING_SIZE,
            max_fields: MAX_FIELDS,
            max_array_size: MAX_ARRAY_SIZE,
            max_depth: MAX_DEPTH,
        }
    }
}

/// Parse exactly one value from `text`; trailing non-whitespace is an error.
pub fn parse(text: &str, limits: &Limits) -> Result<Value, CodecError> {
    if text.len() > limits.max_json_size {
        return Err(CodecError::InputTooLarge { limit: limits.max_json_size });
    }

    let mut parser = Parser { src: text.as_bytes(), pos: 0, limits };
    let value = parser.parse_value(0)?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(CodecError::TrailingCharacters(parser.pos));
    }
    Ok(value)
}

/// Serialize a value. Total: every `Value` has a textual form.
pub fn serialize(value: &Value) -> String {
    let mut out = String::with_capacity(64);
    write_value(value, &mut out);
    out
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    limits: &'a Limits,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> CodecError {
        if self.pos >= self.src.len() {
            CodecError::UnexpectedEnd
        } else {
            CodecError::UnexpectedChar(self.pos)
        }
    }

    fn enter(&self, depth: usize) -> Result<(), CodecError> {
        if depth > self.limits.max_depth {
            return Err(CodecError::TooDeep { limit: self.limits.max_depth });
        }
        Ok(())
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, CodecError> {
        self.skip_ws();
        match self.peek() {
            None => Err(CodecError::UnexpectedEnd),
            Some(b'"') => self.parse_string().map(Value::String),
            Some(b'{') => self.parse_object(depth),
            Some(b'[') => self.parse_array(depth),
            Some(b't') => self.parse_literal(b"true", Value::Bool(true)),
            Some(b'f') => self.parse_literal(b"false", Value::Bool(false)),
            Some(b'n') => self.parse_literal(b"null", Value::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_integer().map(Value::Integer),
            Some(_) => Err(CodecError::UnexpectedChar(self.pos)),
        }
    }

    fn parse_literal(&mut self, literal: &[u8], value: Value) -> Result<Value, CodecError> {
        if self.src[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            Ok(value)
        } else {
            Err(CodecError::UnexpectedChar(self.pos))
        }
    }

    fn parse_object(&mut self, depth: usize) -> Result<Value, CodecError> {
        self.enter(depth)?;
        self.pos += 1;
        let mut obj = Object::new();

        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Object(obj));
        }

        loop {
            self.skip_ws();
            if self.peek() != Some(b'"') {
                return Err(self.unexpected());
            }
            let key = self.parse_string()?;

            self.skip_ws();
            if self.peek() != Some(b':') {
                return Err(self.unexpected());
            }
            self.pos += 1;

            let value = self.parse_value(depth + 1)?;
            obj.insert(key, value);
            if obj.len() > self.limits.max_fields {
                return Err(CodecError::TooManyFields { limit: self.limits.max_fields });
            }

            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(obj));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<Value, CodecError> {
        self.enter(depth)?;
        self.pos += 1;
        let mut items = Vec::new();

        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Array(items));
        }

        loop {
            items.push(self.parse_value(depth + 1)?);
            if items.len() > self.limits.max_array_size {
                return Err(CodecError::ArrayTooLong { limit: self.limits.max_array_size });
            }

            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, CodecError> {
        self.pos += 1;
        let mut out = Vec::with_capacity(16);

        loop {
            let at = self.pos;
            let c = self.peek().ok_or(CodecError::UnexpectedEnd)?;
            self.pos += 1;

            match c {
                b'"' => break,
                b'\\' => {
                    let esc = self.peek().ok_or(CodecError::UnexpectedEnd)?;
                    self.pos += 1;
                    let byte = match esc {
                        b'"' => Some(b'"'),
                        b'\\' => Some(b'\\'),
                        b'/' => Some(b'/'),
                        b'b' => Some(0x08),
                        b'f' => Some(0x0c),
                        b'n' => Some(b'\n'),
                        b'r' => Some(b'\r'),
                        b't' => Some(b'\t'),
                        b'u' => {
                            let ch = self.parse_unicode_escape(at)?;
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                            None
                        }
                        _ => return Err(CodecError::InvalidEscape(at)),
                    };
                    if let Some(byte) = byte {
                        out.push(byte);
                    }
                }
                c if c < 0x20 => return Err(CodecError::ControlChar(at)),
                c => out.push(c),
            }

            if out.len() > self.limits.max_string_size {
                return Err(CodecError::StringTooLong { limit: self.limits.max_string_size });
            }
        }

        String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Four hex digits after `\u`. Surrogate halves are rejected.
    fn parse_unicode_escape(&mut self, at: usize) -> Result<char, CodecError> {
        let end = (self.pos + 4).min(self.src.len());
        let digits = &self.src[self.pos..end];
        if !digits.iter().all(u8::is_ascii_hexdigit) {
            return Err(CodecError::InvalidEscape(at));
        }
        if digits.len() < 4 {
            return Err(CodecError::UnexpectedEnd);
        }
        let code = digits
            .iter()
            .fold(0u32, |acc, d| (acc << 4) | (*d as char).to_digit(16).unwrap_or(0));
        self.pos = end;
        char::from_u32(code).ok_or(CodecError::InvalidEscape(at))
    }

    fn parse_integer(&mut self) -> Result<i64, CodecError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        if !matches!(self.peek(), Some(b'0'..=b'9')) {
            return Err(CodecError::InvalidNumber(start));
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        // integers only
        if matches!(self.peek(), Some(b'.' | b'e' | b'E')) {
            return Err(CodecError::InvalidNumber(start));
        }

        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse::<i64>().ok())
            .ok_or(CodecError::InvalidNumber(start))
    }
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => write_string(s, out),
        Value::Object(obj) => {
            out.push('{');
            for (i, (key, val)) in obj.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Bytes `c` occupies once written inside a serialized string.
pub fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\u{8}' | '\u{c}' | '\n' | '\r' | '\t' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}
