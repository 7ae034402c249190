//! PQL lexer — turns source text into a position-tagged token stream.
//!
//! The lexer never aborts: unexpected characters and unterminated strings are
//! collected as [`LexError`]s while a best-effort token is still emitted, so
//! the parser (and the autocomplete engine) can keep going.

use crate::error::LexError;
use crate::token::{lookup_keyword, Position, Token, TokenKind};

/// Tokenize `input`. The returned stream always ends with a [`TokenKind::Eof`] token.
pub fn tokenize(input: &str) -> (Vec<Token>, Vec<LexError>) {
    Lexer::new(input).run()
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

struct Lexer {
    chars: Vec<char>,
    idx: usize,
    offset: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            idx: 0,
            offset: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.idx + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.idx += 1;
        self.offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn pos(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    fn push(&mut self, kind: TokenKind, literal: impl Into<String>, start: Position) {
        self.tokens.push(Token::new(kind, literal, start, self.offset));
    }

    /// A statement may begin at the start of input, after `;`, or on a fresh line.
    fn at_statement_position(&self, start: Position) -> bool {
        match self.tokens.last() {
            None => true,
            Some(last) => last.kind == TokenKind::Semicolon || last.pos.line < start.line,
        }
    }

    fn run(mut self) -> (Vec<Token>, Vec<LexError>) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
                continue;
            }

            let start = self.pos();
            match ch {
                '-' if self.peek_at(1) == Some('-') => self.lex_dashes(start),
                '-' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number(start)
                }
                ':' => self.lex_meta(start),
                '"' | '\'' => self.lex_string(start, ch),
                c if c.is_ascii_digit() => self.lex_number(start),
                c if is_ident_start(c) => self.lex_word(start),
                _ => self.lex_symbol(start, ch),
            }
        }

        let end = self.pos();
        self.push(TokenKind::Eof, "", end);
        (self.tokens, self.errors)
    }

    /// `--` starts a line comment, or a flag when an identifier follows directly.
    fn lex_dashes(&mut self, start: Position) {
        self.bump();
        self.bump();
        if self.peek().is_some_and(is_ident_start) {
            let name = self.take_while(|c| is_ident_char(c) || c == '-');
            self.push(TokenKind::Flag, name, start);
            return;
        }
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn lex_meta(&mut self, start: Position) {
        if !self.at_statement_position(start) {
            self.bump();
            self.errors.push(LexError::UnexpectedChar { ch: ':', pos: start });
            self.push(TokenKind::Illegal, ":", start);
            return;
        }
        self.bump();
        let name = self.take_while(is_ident_char);
        self.push(TokenKind::MetaCommand, name, start);
    }

    fn lex_string(&mut self, start: Position, quote: char) {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    self.errors.push(LexError::UnterminatedString { pos: start });
                    break;
                }
                Some(ch) if ch == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => {
                        self.errors.push(LexError::UnterminatedString { pos: start });
                        break;
                    }
                },
                Some(ch) => value.push(ch),
            }
        }
        self.push(TokenKind::String, value, start);
    }

    fn lex_number(&mut self, start: Position) {
        let mut text = String::new();
        if self.peek() == Some('-') {
            self.bump();
            text.push('-');
        }
        text.push_str(&self.take_while(|c| c.is_ascii_digit()));

        let is_float = self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.bump();
            text.push('.');
            text.push_str(&self.take_while(|c| c.is_ascii_digit()));
            self.push(TokenKind::Float, text, start);
        } else {
            self.push(TokenKind::Int, text, start);
        }
    }

    fn lex_word(&mut self, start: Position) {
        let word = self.take_while(is_ident_char);
        let kind = lookup_keyword(&word).unwrap_or(TokenKind::Ident);
        self.push(kind, word, start);
    }

    fn lex_symbol(&mut self, start: Position, ch: char) {
        self.bump();
        let next_is_eq = self.peek() == Some('=');
        let kind = match ch {
            '=' => TokenKind::Eq,
            '!' if next_is_eq => TokenKind::Neq,
            '>' if next_is_eq => TokenKind::Gte,
            '<' if next_is_eq => TokenKind::Lte,
            '>' => TokenKind::Gt,
            '<' => TokenKind::Lt,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            _ => {
                self.errors.push(LexError::UnexpectedChar { ch, pos: start });
                self.push(TokenKind::Illegal, ch.to_string(), start);
                return;
            }
        };

        let mut literal = ch.to_string();
        if matches!(kind, TokenKind::Neq | TokenKind::Gte | TokenKind::Lte) {
            self.bump();
            literal.push('=');
        }
        self.push(kind, literal, start);
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            out.push(ch);
            self.bump();
        }
        out
    }
}
