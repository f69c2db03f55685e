//! PDF tokenizer.
//!
//! Splits raw bytes into names, numbers, strings, keywords and the
//! `<<` `>>` `[` `]` delimiters. Structural parsing lives in `pdf_parser`.

use crate::error::{PdfError, Result};
use crate::model::objects::name_from_bytes;

/// Lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Real(f64),
    Bool(bool),
    /// Name without the leading slash, `#xx` escapes decoded, one char
    /// per byte
    Name(String),
    /// Bare keyword or delimiter (`obj`, `R`, `<<`, `]`, ...)
    Keyword(Vec<u8>),
    /// Literal or hex string contents
    String(Vec<u8>),
}

impl Token {
    pub fn is_keyword(&self, kw: &[u8]) -> bool {
        matches!(self, Self::Keyword(k) if k == kw)
    }
}

pub const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

pub const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Tokenizer over a borrowed byte slice.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position in the input.
    pub const fn tell(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Skip whitespace and `%` comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.advance() {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn lex_name(&mut self) -> Token {
        self.pos += 1;
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
            if b == b'#' {
                let hi = self.peek().and_then(hex_value);
                let lo = self.peek_at(1).and_then(hex_value);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    self.pos += 2;
                    name.push(hi << 4 | lo);
                    continue;
                }
                // A lone '#' is dropped and the following bytes kept.
                continue;
            }
            name.push(b);
        }

        Token::Name(name_from_bytes(&name))
    }

    fn lex_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.pos += 1;
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.pos]).map_err(|_| {
            PdfError::TokenError {
                pos: start,
                msg: "invalid number".into(),
            }
        })?;

        if has_dot {
            // "-." and "." are read as zero, like most readers do.
            let digits = text.trim_start_matches(['+', '-']);
            if digits == "." {
                return Ok(Token::Real(0.0));
            }
            let val: f64 = text.parse().map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid real: {text}"),
            })?;
            Ok(Token::Real(val))
        } else {
            let val: i64 = text.parse().map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid int: {text}"),
            })?;
            Ok(Token::Int(val))
        }
    }

    fn lex_literal_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        let mut result = Vec::new();
        let mut depth = 1usize;

        loop {
            let Some(c) = self.advance() else {
                return Err(PdfError::TokenError {
                    pos: start,
                    msg: "unterminated string".into(),
                });
            };
            match c {
                b'(' => {
                    depth += 1;
                    result.push(c);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    result.push(c);
                }
                b'\\' => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'\r') => {
                        if self.peek() == Some(b'\n') {
                            self.pos += 1;
                        }
                    }
                    Some(b'\n') => {}
                    Some(d @ b'0'..=b'7') => {
                        let mut octal = u32::from(d - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    self.pos += 1;
                                    octal = octal * 8 + u32::from(d - b'0');
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    // \( \) \\ and unknown escapes keep the character.
                    Some(other) => result.push(other),
                    None => {
                        return Err(PdfError::TokenError {
                            pos: start,
                            msg: "unterminated string".into(),
                        });
                    }
                },
                _ => result.push(c),
            }
        }

        Ok(Token::String(result))
    }

    fn lex_hex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.pos += 1;
        let mut nibbles = Vec::new();

        loop {
            match self.advance() {
                Some(b'>') => break,
                Some(c) if is_whitespace(c) => {}
                Some(c) => match hex_value(c) {
                    Some(v) => nibbles.push(v),
                    None => {
                        return Err(PdfError::TokenError {
                            pos: self.pos - 1,
                            msg: format!("invalid byte {c:#04x} in hex string"),
                        });
                    }
                },
                None => {
                    return Err(PdfError::TokenError {
                        pos: start,
                        msg: "unterminated hex string".into(),
                    });
                }
            }
        }

        // An odd trailing digit is padded with zero.
        let bytes = nibbles
            .chunks(2)
            .map(|pair| pair[0] << 4 | pair.get(1).copied().unwrap_or(0))
            .collect();
        Ok(Token::String(bytes))
    }

    fn lex_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        let keyword = &self.data[start..self.pos];
        match keyword {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            _ => Token::Keyword(keyword.to_vec()),
        }
    }

    fn single(&mut self, len: usize, kw: &[u8]) -> Token {
        self.pos += len;
        Token::Keyword(kw.to_vec())
    }

    /// Next token with its start offset, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();
        let start = self.pos;
        let b = self.peek()?;

        let result = match b {
            b'/' => Ok(self.lex_name()),
            b'(' => self.lex_literal_string(),
            b'<' if self.peek_at(1) == Some(b'<') => Ok(self.single(2, b"<<")),
            b'<' => self.lex_hex_string(),
            b'>' if self.peek_at(1) == Some(b'>') => Ok(self.single(2, b">>")),
            b'[' => Ok(self.single(1, b"[")),
            b']' => Ok(self.single(1, b"]")),
            b'>' | b')' | b'{' | b'}' => Ok(self.single(1, &[b])),
            b'+' | b'-' | b'.' if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') => {
                self.lex_number()
            }
            c if c.is_ascii_digit() => self.lex_number(),
            _ => Ok(self.lex_keyword()),
        };

        Some(result.map(|token| (start, token)))
    }
}

const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
