//! Token model shared by the lexer, parser, and autocomplete engine.

use serde::{Deserialize, Serialize};

/// Every kind of token the lexer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    // Verbs
    Find,
    Get,
    Count,
    Create,
    Update,
    Delete,
    // Reserved verbs: they lex so the parser can reject them by name.
    Explain,
    Aggregate,
    Upsert,

    // Clause keywords
    Where,
    Select,
    Include,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    Set,

    // Logical and membership operators
    And,
    Or,
    Not,
    In,
    Like,

    // Literals
    Ident,
    String,
    Int,
    Float,
    True,
    False,
    Null,

    // Comparison operators
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,

    // Punctuation
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semicolon,

    /// `:name` at statement position.
    MetaCommand,
    /// `--name`.
    Flag,
    /// A character the lexer could not classify.
    Illegal,
    /// End-of-input sentinel.
    Eof,
}

/// Keyword table, matched case-insensitively against identifiers.
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("find", TokenKind::Find),
    ("get", TokenKind::Get),
    ("count", TokenKind::Count),
    ("create", TokenKind::Create),
    ("update", TokenKind::Update),
    ("delete", TokenKind::Delete),
    ("explain", TokenKind::Explain),
    ("aggregate", TokenKind::Aggregate),
    ("upsert", TokenKind::Upsert),
    ("where", TokenKind::Where),
    ("select", TokenKind::Select),
    ("include", TokenKind::Include),
    ("order", TokenKind::Order),
    ("by", TokenKind::By),
    ("asc", TokenKind::Asc),
    ("desc", TokenKind::Desc),
    ("limit", TokenKind::Limit),
    ("offset", TokenKind::Offset),
    ("set", TokenKind::Set),
    ("and", TokenKind::And),
    ("or", TokenKind::Or),
    ("not", TokenKind::Not),
    ("in", TokenKind::In),
    ("like", TokenKind::Like),
    ("true", TokenKind::True),
    ("false", TokenKind::False),
    ("null", TokenKind::Null),
];

/// Look up a keyword, ignoring ASCII case.
pub fn lookup_keyword(word: &str) -> Option<TokenKind> {
    KEYWORDS
        .iter()
        .find(|(kw, _)| kw.eq_ignore_ascii_case(word))
        .map(|(_, kind)| *kind)
}

/// The verbs that start a statement, in the order they are offered to users.
pub const VERBS: &[&str] = &["find", "get", "count", "create", "update", "delete"];

impl TokenKind {
    /// Implemented statement verbs.
    pub fn is_verb(self) -> bool {
        matches!(
            self,
            TokenKind::Find
                | TokenKind::Get
                | TokenKind::Count
                | TokenKind::Create
                | TokenKind::Update
                | TokenKind::Delete
        )
    }

    /// Verbs that are recognized but not implemented.
    pub fn is_reserved_verb(self) -> bool {
        matches!(
            self,
            TokenKind::Explain | TokenKind::Aggregate | TokenKind::Upsert
        )
    }

    /// Tokens that begin a new statement; the parser resynchronizes on these.
    pub fn starts_statement(self) -> bool {
        self.is_verb() || self.is_reserved_verb() || self == TokenKind::MetaCommand
    }

    /// `=`, `!=`, `>`, `<`, `>=`, `<=`.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::Neq
                | TokenKind::Gt
                | TokenKind::Lt
                | TokenKind::Gte
                | TokenKind::Lte
        )
    }

    /// Literal value tokens.
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::String
                | TokenKind::Int
                | TokenKind::Float
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
        )
    }

    /// Identifiers and every keyword: anything made of identifier characters.
    pub fn is_word(self) -> bool {
        self == TokenKind::Ident || self.keyword_text().is_some()
    }

    /// Canonical lowercase spelling for keyword kinds.
    pub fn keyword_text(self) -> Option<&'static str> {
        KEYWORDS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(kw, _)| *kw)
    }
}

/// Location of a token in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Absolute byte offset.
    pub offset: usize,
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A lexed token. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text; string literals are stored unescaped and without quotes,
    /// meta-commands and flags without their `:`/`--` prefix.
    pub literal: String,
    pub pos: Position,
    /// Byte offset one past the last source byte of the token.
    pub end: usize,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, pos: Position, end: usize) -> Self {
        Self {
            kind,
            literal: literal.into(),
            pos,
            end,
        }
    }

    /// Human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::String => format!("string \"{}\"", self.literal),
            TokenKind::Ident => format!("identifier '{}'", self.literal),
            TokenKind::MetaCommand => format!("meta-command ':{}'", self.literal),
            TokenKind::Flag => format!("flag '--{}'", self.literal),
            _ => format!("'{}'", self.literal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup_ignores_case() {
        assert_eq!(lookup_keyword("FIND"), Some(TokenKind::Find));
        assert_eq!(lookup_keyword("Where"), Some(TokenKind::Where));
        assert_eq!(lookup_keyword("lease"), None);
    }

    #[test]
    fn test_statement_starters() {
        assert!(TokenKind::Find.starts_statement());
        assert!(TokenKind::Explain.starts_statement());
        assert!(TokenKind::MetaCommand.starts_statement());
        assert!(!TokenKind::Where.starts_statement());
    }

    #[test]
    fn test_keyword_text_round_trips() {
        for verb in VERBS {
            let kind = lookup_keyword(verb).unwrap();
            assert_eq!(kind.keyword_text(), Some(*verb));
            assert!(kind.is_word());
        }
        assert!(!TokenKind::Comma.is_word());
    }
}
