// Copyright 2024 The lispr Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizer over an in-memory UTF-8 source buffer. Classifies the
//! primitive tokens of the surface language — parens, quote, number,
//! string, symbol, end — and reports malformed constructs (bad escapes,
//! invalid UTF-8, unterminated strings) as side-channel errors rather
//! than failing outright, so a single bad token never stops the scan.

use crate::parse_error::ParseErrorKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    Quote,
    Symbol,
    String,
    Number,
    End,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// Valid when `kind == Number`.
    pub number: f64,
    /// Valid when `kind == Symbol` (raw bytes) or `String` (escapes resolved).
    pub text: Vec<u8>,
}

/// A malformed construct found while lexing. Reported out of band; the
/// lexer keeps scanning afterward rather than stopping at the first one.
#[derive(Clone, Copy, Debug)]
pub struct LexError {
    pub kind: ParseErrorKind,
    pub start: usize,
    pub end: usize,
}

fn is_whitespace(c: char) -> bool {
    matches!(c, '\u{09}' | '\u{0A}' | '\u{0D}' | '\u{20}')
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_numeric_continue(c: char) -> bool {
    is_digit(c) || c == '.'
}

fn is_numeric_start(c: char) -> bool {
    is_numeric_continue(c) || c == '+' || c == '-'
}

fn is_delimiter(c: char) -> bool {
    is_whitespace(c) || c == '(' || c == ')'
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    pub errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a [u8]) -> Lexer<'a> {
        Lexer { input, pos: 0, errors: Vec::new() }
    }

    pub fn take_errors(&mut self) -> Vec<LexError> {
        std::mem::take(&mut self.errors)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Decodes the codepoint starting at `pos`, if any. `Ok` carries the
    /// character and its width in bytes; `Err` carries how many bytes to
    /// skip to resynchronize past an invalid sequence.
    fn decode_at(&self, pos: usize) -> Option<Result<(char, usize), usize>> {
        if pos >= self.input.len() {
            return None;
        }
        let b0 = self.input[pos];
        let width = if b0 < 0x80 {
            1
        } else if b0 & 0xE0 == 0xC0 {
            2
        } else if b0 & 0xF0 == 0xE0 {
            3
        } else if b0 & 0xF8 == 0xF0 {
            4
        } else {
            return Some(Err(1));
        };
        if pos + width > self.input.len() {
            return Some(Err(self.input.len() - pos));
        }
        let mut val: u32 = match width {
            1 => b0 as u32,
            2 => (b0 & 0x1F) as u32,
            3 => (b0 & 0x0F) as u32,
            _ => (b0 & 0x07) as u32,
        };
        for byte in &self.input[pos + 1..pos + width] {
            if byte & 0xC0 != 0x80 {
                return Some(Err(1));
            }
            val = (val << 6) | (*byte & 0x3F) as u32;
        }
        match char::from_u32(val) {
            Some(c) => Some(Ok((c, width))),
            None => Some(Err(width)),
        }
    }

    fn peek(&self) -> Option<Result<char, ()>> {
        match self.decode_at(self.pos) {
            None => None,
            Some(Ok((c, _))) => Some(Ok(c)),
            Some(Err(_)) => Some(Err(())),
        }
    }

    /// Advances past one invalid byte sequence at the current position,
    /// recording an `InvalidUtf8` error for its span.
    fn skip_invalid_utf8(&mut self) {
        let start = self.pos;
        let width = match self.decode_at(self.pos) {
            Some(Err(w)) => w.max(1),
            _ => 1,
        };
        self.pos += width;
        self.errors.push(LexError { kind: ParseErrorKind::InvalidUtf8, start, end: self.pos });
    }

    fn bump(&mut self) -> Option<char> {
        match self.decode_at(self.pos) {
            None => None,
            Some(Ok((c, width))) => {
                self.pos += width;
                Some(c)
            }
            Some(Err(_)) => {
                self.skip_invalid_utf8();
                None
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(Ok(c)) if is_whitespace(c) => {
                    self.bump();
                }
                Some(Ok(';')) => {
                    while let Some(Ok(c)) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(Err(())) => {
                    self.skip_invalid_utf8();
                }
                _ => break,
            }
        }
    }

    fn hex_value(c: char) -> Option<u32> {
        c.to_digit(16)
    }

    /// Consumes one escape sequence after a backslash already seen, pushing
    /// its decoded bytes onto `out` (UTF-8 encoded for `\x`/`\u{..}`).
    /// `backslash_index` is the position of the `\` itself.
    fn read_escape(&mut self, backslash_index: usize, out: &mut Vec<u8>) {
        let Some(c) = self.bump() else {
            self.errors.push(LexError {
                kind: ParseErrorKind::InvalidEscape,
                start: backslash_index,
                end: self.pos,
            });
            return;
        };
        match c {
            '"' => out.push(b'"'),
            '\'' => out.push(b'\''),
            '0' => out.push(0),
            '\\' => out.push(b'\\'),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'x' => {
                let mut val: u32 = 0;
                let mut ok = true;
                for _ in 0..2 {
                    match self.peek() {
                        Some(Ok(d)) if Self::hex_value(d).is_some() => {
                            val = (val << 4) | Self::hex_value(d).unwrap();
                            self.bump();
                        }
                        _ => {
                            ok = false;
                            break;
                        }
                    }
                }
                if !ok {
                    self.errors.push(LexError {
                        kind: ParseErrorKind::InvalidEscape,
                        start: backslash_index,
                        end: self.pos,
                    });
                } else {
                    out.push(val as u8);
                }
            }
            'u' => {
                if self.peek() != Some(Ok('{')) {
                    self.errors.push(LexError {
                        kind: ParseErrorKind::InvalidEscape,
                        start: backslash_index,
                        end: self.pos,
                    });
                    return;
                }
                self.bump();
                let mut val: u32 = 0;
                let mut digits = 0u32;
                loop {
                    match self.peek() {
                        Some(Ok('}')) => {
                            self.bump();
                            break;
                        }
                        Some(Ok(d)) if Self::hex_value(d).is_some() => {
                            digits += 1;
                            val = (val << 4) | Self::hex_value(d).unwrap();
                            self.bump();
                        }
                        _ => {
                            self.errors.push(LexError {
                                kind: ParseErrorKind::InvalidEscape,
                                start: backslash_index,
                                end: self.pos,
                            });
                            return;
                        }
                    }
                }
                let valid = digits >= 1
                    && digits <= 6
                    && val <= 0x10FFFF
                    && !(0xD800..=0xDFFF).contains(&val);
                match char::from_u32(val).filter(|_| valid) {
                    Some(ch) => {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    }
                    None => {
                        self.errors.push(LexError {
                            kind: ParseErrorKind::InvalidEscape,
                            start: backslash_index,
                            end: self.pos,
                        });
                    }
                }
            }
            _ => {
                self.errors.push(LexError {
                    kind: ParseErrorKind::InvalidEscape,
                    start: backslash_index,
                    end: self.pos,
                });
            }
        }
    }

    fn read_string(&mut self, start: usize) -> Token {
        let mut text = Vec::new();
        loop {
            match self.decode_at(self.pos) {
                None => {
                    self.errors.push(LexError {
                        kind: ParseErrorKind::UnterminatedString,
                        start,
                        end: self.pos,
                    });
                    return Token { kind: TokenKind::String, start, end: self.pos, number: 0.0, text };
                }
                Some(Err(_)) => {
                    self.skip_invalid_utf8();
                }
                Some(Ok(('"', width))) => {
                    self.pos += width;
                    break;
                }
                Some(Ok(('\\', width))) => {
                    let backslash_index = self.pos;
                    self.pos += width;
                    self.read_escape(backslash_index, &mut text);
                }
                Some(Ok((c, width))) => {
                    let mut buf = [0u8; 4];
                    text.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    self.pos += width;
                }
            }
        }
        let end = self.pos;
        match self.peek() {
            None => {}
            Some(Ok(c)) if is_delimiter(c) => {}
            _ => {
                self.errors.push(LexError { kind: ParseErrorKind::InvalidSuffix, start, end });
            }
        }
        Token { kind: TokenKind::String, start, end, number: 0.0, text }
    }

    fn read_symbol_or_number(&mut self, start: usize, first: char) -> Token {
        let mut encountered_dots = if first == '.' { 1 } else { 0 };
        let mut valid_number = is_numeric_start(first);
        let mut contains_digit = is_digit(first);
        loop {
            match self.peek() {
                Some(Ok(c)) if !is_delimiter(c) => {
                    if c == '.' {
                        encountered_dots += 1;
                    }
                    valid_number = valid_number && is_numeric_continue(c);
                    contains_digit = contains_digit || is_digit(c);
                    self.bump();
                }
                Some(Err(())) => {
                    self.skip_invalid_utf8();
                    valid_number = false;
                }
                _ => break,
            }
        }
        let end = self.pos;
        let raw = &self.input[start..end];
        if valid_number && encountered_dots <= 1 && contains_digit {
            let text = std::str::from_utf8(raw).expect("validated digits/sign/dot are ASCII");
            let number: f64 = text.parse().expect("lexer-validated number grammar is a valid f64 literal");
            Token { kind: TokenKind::Number, start, end, number, text: Vec::new() }
        } else {
            Token { kind: TokenKind::Symbol, start, end, number: 0.0, text: raw.to_vec() }
        }
    }

    /// Scans and returns the next token, appending to `errors` as a side
    /// effect for any malformed construct found along the way. Always
    /// returns a token — even an unterminated string yields `String` with
    /// whatever was read, matching the error already queued.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        let c = match self.bump() {
            Some(c) => c,
            None => return Token { kind: TokenKind::End, start, end: self.pos, number: 0.0, text: Vec::new() },
        };
        match c {
            '"' => self.read_string(start),
            '\'' => Token { kind: TokenKind::Quote, start, end: self.pos, number: 0.0, text: Vec::new() },
            '(' => Token { kind: TokenKind::LeftParen, start, end: self.pos, number: 0.0, text: Vec::new() },
            ')' => Token { kind: TokenKind::RightParen, start, end: self.pos, number: 0.0, text: Vec::new() },
            _ => self.read_symbol_or_number(start, c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src.as_bytes());
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = tok.kind == TokenKind::End;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn lexes_nothing() {
        assert_eq!(kinds(""), vec![TokenKind::End]);
    }

    #[test]
    fn lexes_empty_list() {
        assert_eq!(
            kinds("()"),
            vec![TokenKind::LeftParen, TokenKind::RightParen, TokenKind::End]
        );
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(
            kinds("1.0 .1 1. 1.2 +1.2 -1.2"),
            vec![
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn lexes_strange_symbols() {
        assert_eq!(
            kinds("1.0. a\" a'1. .1.2 1+1.2 q-1.2"),
            vec![
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn string_decodes_simple_escapes() {
        let mut lexer = Lexer::new(br#""a\nb\tc""#);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.text, b"a\nb\tc");
        assert!(lexer.errors.is_empty());
    }

    #[test]
    fn string_decodes_unicode_escape() {
        let mut lexer = Lexer::new(br#""\u{41}""#);
        let tok = lexer.next_token();
        assert_eq!(tok.text, b"A");
        assert!(lexer.errors.is_empty());
    }

    #[test]
    fn string_suffix_must_be_followed_by_delimiter() {
        let mut lexer = Lexer::new(br#""" a"#);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::String);
        assert!(lexer.errors.is_empty());

        let mut lexer = Lexer::new(br#""\"a"#);
        let _ = lexer.next_token();
        assert!(lexer.errors.iter().any(|e| e.kind == ParseErrorKind::UnterminatedString));
    }

    #[test]
    fn unterminated_string_reports_error() {
        let mut lexer = Lexer::new(br#""abc"#);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(lexer.errors.len(), 1);
        assert_eq!(lexer.errors[0].kind, ParseErrorKind::UnterminatedString);
    }

    #[test]
    fn complex_escape_errors() {
        for src in [&br#""\u""#[..], br#""\u{""#, br#""\u{AV""#, br#""\xA""#] {
            let mut lexer = Lexer::new(src);
            let _ = lexer.next_token();
            assert!(
                !lexer.errors.is_empty(),
                "expected an error for {:?}",
                String::from_utf8_lossy(src)
            );
        }
    }

    #[test]
    fn invalid_utf8_byte_is_reported() {
        let mut lexer = Lexer::new(&[0x88]);
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::End);
        assert_eq!(lexer.errors.len(), 1);
        assert_eq!(lexer.errors[0].kind, ParseErrorKind::InvalidUtf8);
    }

    #[test]
    fn quote_is_its_own_token() {
        assert_eq!(kinds("'x"), vec![TokenKind::Quote, TokenKind::Symbol, TokenKind::End]);
    }
}
