//! PQL parser — recursive descent over the lexer's token stream.
//!
//! Grammar:
//! ```text
//! input     := (statement ';'?)*
//! statement := find | get | count | create | update | delete | meta
//! find      := FIND ident (where | select | include | order | limit | offset)*   -- each clause at most once
//! get       := GET ident literal [INCLUDE paths]
//! count     := COUNT ident [WHERE expr]
//! create    := CREATE ident SET assignments
//! update    := UPDATE ident literal SET assignments
//! delete    := DELETE ident literal
//! meta      := ':'name arg*
//! expr      := and (OR and)*
//! and       := not (AND not)*
//! not       := NOT not | primary
//! primary   := '(' expr ')' | path op literal | path LIKE literal | path IN '[' literals ']'
//! path      := ident ('.' ident)*
//! ```
//!
//! A failed statement does not stop the parse: the parser skips ahead to the
//! next verb or meta-command and continues.

use crate::ast::*;
use crate::error::{LexError, ParseError};
use crate::lexer::tokenize;
use crate::suggest::closest;
use crate::token::{Token, TokenKind, VERBS};

type ParseResult<T> = Result<T, ParseError>;

const FIND_CLAUSES: &[&str] = &["where", "select", "include", "order", "limit", "offset"];

/// Parse a token stream into statements, collecting errors along the way.
pub fn parse(tokens: &[Token]) -> (Vec<Statement>, Vec<ParseError>) {
    Parser::new(tokens).run()
}

/// Everything produced by running the lexer and parser over one input.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub tokens: Vec<Token>,
    pub statements: Vec<Statement>,
    pub lex_errors: Vec<LexError>,
    pub parse_errors: Vec<ParseError>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        !self.lex_errors.is_empty() || !self.parse_errors.is_empty()
    }
}

/// Tokenize and parse `input` in one step.
pub fn parse_str(input: &str) -> ParseOutput {
    let (tokens, lex_errors) = tokenize(input);
    let (statements, parse_errors) = parse(&tokens);
    ParseOutput {
        tokens,
        statements,
        lex_errors,
        parse_errors,
    }
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &'t Token {
        // The lexer always terminates the stream with Eof; clamp to it.
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn kind(&self) -> TokenKind {
        if self.tokens.is_empty() {
            return TokenKind::Eof;
        }
        self.current().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn advance(&mut self) -> &'t Token {
        let tok = self.current();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error_here(&self, expected: &str) -> ParseError {
        if self.tokens.is_empty() {
            return ParseError::new(format!("expected {expected}, found end of input"), Default::default());
        }
        let tok = self.current();
        ParseError::new(format!("expected {expected}, found {}", tok.describe()), tok.pos)
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<&'t Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(expected))
        }
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map_or(TokenKind::Eof, |tok| tok.kind)
    }

    /// Field names may collide with keywords (`order`, `count`). A verb
    /// followed by an entity name still starts the next statement.
    fn at_name(&self) -> bool {
        let kind = self.kind();
        kind == TokenKind::Ident
            || (kind.is_word() && !(kind.starts_statement() && self.peek_kind() == TokenKind::Ident))
    }

    fn expect_name(&mut self, expected: &str) -> ParseResult<&'t Token> {
        if self.at_name() {
            Ok(self.advance())
        } else {
            Err(self.error_here(expected))
        }
    }

    /// Meta-command arguments run to `;`, the next meta-command, or a verb
    /// on a later line. Verbs on the same line are arguments (`:help find`).
    fn at_meta_end(&self, line: usize) -> bool {
        let tok = self.current();
        match tok.kind {
            TokenKind::Eof | TokenKind::Semicolon | TokenKind::MetaCommand => true,
            kind => kind.starts_statement() && tok.pos.line != line,
        }
    }

    fn run(mut self) -> (Vec<Statement>, Vec<ParseError>) {
        let mut statements = Vec::new();
        let mut errors = Vec::new();

        while !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Semicolon) {
                self.advance();
                continue;
            }

            if !self.kind().starts_statement() {
                errors.push(self.not_a_statement());
                self.advance();
                self.synchronize();
                continue;
            }

            match self.parse_statement() {
                Ok(stmt) => match self.kind() {
                    TokenKind::Eof | TokenKind::Semicolon => statements.push(stmt),
                    k if k.starts_statement() => statements.push(stmt),
                    _ => {
                        errors.push(self.trailing_token(&stmt));
                        self.synchronize();
                    }
                },
                Err(err) => {
                    errors.push(err);
                    self.synchronize();
                }
            }
        }

        (statements, errors)
    }

    /// Skip to the next token that can begin a statement.
    fn synchronize(&mut self) {
        while !self.at(TokenKind::Eof) && !self.kind().starts_statement() {
            self.advance();
        }
    }

    fn not_a_statement(&self) -> ParseError {
        let tok = self.current();
        let hint = if tok.kind == TokenKind::Ident {
            closest(&tok.literal, VERBS.iter().copied())
                .map(|v| format!(" (did you mean '{v}'?)"))
                .unwrap_or_default()
        } else {
            String::new()
        };
        ParseError::new(
            format!(
                "expected a statement (find, get, count, create, update, delete, or :command), found {}{hint}",
                tok.describe()
            ),
            tok.pos,
        )
    }

    fn trailing_token(&self, stmt: &Statement) -> ParseError {
        let tok = self.current();
        let mut message = format!("unexpected {} after {} statement", tok.describe(), stmt.verb());
        if tok.kind == TokenKind::Ident && matches!(stmt, Statement::Find(_)) {
            if let Some(kw) = closest(&tok.literal, FIND_CLAUSES.iter().copied()) {
                message.push_str(&format!(" (did you mean '{kw}'?)"));
            }
        } else if tok.kind.is_word() && tok.kind != TokenKind::Ident {
            message.push_str(&format!(
                " ('{}' is not valid here)",
                tok.literal.to_ascii_lowercase()
            ));
        }
        ParseError::new(message, tok.pos)
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.kind() {
            TokenKind::Find => self.parse_find().map(Statement::Find),
            TokenKind::Get => self.parse_get().map(Statement::Get),
            TokenKind::Count => self.parse_count().map(Statement::Count),
            TokenKind::Create => self.parse_create().map(Statement::Create),
            TokenKind::Update => self.parse_update().map(Statement::Update),
            TokenKind::Delete => self.parse_delete().map(Statement::Delete),
            TokenKind::MetaCommand => self.parse_meta().map(Statement::Meta),
            _ => {
                let tok = self.advance();
                Err(ParseError::new(
                    format!(
                        "'{}' is reserved but not supported yet",
                        tok.literal.to_ascii_lowercase()
                    ),
                    tok.pos,
                ))
            }
        }
    }

    fn parse_entity(&mut self) -> ParseResult<Ident> {
        let tok = self.expect(TokenKind::Ident, "an entity name")?;
        Ok(Ident {
            name: tok.literal.clone(),
            pos: tok.pos,
        })
    }

    fn parse_find(&mut self) -> ParseResult<FindStmt> {
        self.advance();
        let mut stmt = FindStmt::new(self.parse_entity()?);

        loop {
            let tok = self.current();
            match tok.kind {
                TokenKind::Where => {
                    reject_duplicate(stmt.filter.is_some(), tok)?;
                    self.advance();
                    stmt.filter = Some(self.parse_expr()?);
                }
                TokenKind::Select => {
                    reject_duplicate(stmt.select.is_some(), tok)?;
                    self.advance();
                    stmt.select = Some(self.parse_path_list("a field name")?);
                }
                TokenKind::Include => {
                    reject_duplicate(stmt.include.is_some(), tok)?;
                    self.advance();
                    stmt.include = Some(self.parse_path_list("an edge name")?);
                }
                TokenKind::Order => {
                    reject_duplicate(stmt.order_by.is_some(), tok)?;
                    self.advance();
                    self.expect(TokenKind::By, "'by' after 'order'")?;
                    stmt.order_by = Some(self.parse_order_terms()?);
                }
                TokenKind::Limit => {
                    reject_duplicate(stmt.limit.is_some(), tok)?;
                    self.advance();
                    stmt.limit = Some(self.parse_int("a number after 'limit'")?);
                }
                TokenKind::Offset => {
                    reject_duplicate(stmt.offset.is_some(), tok)?;
                    self.advance();
                    stmt.offset = Some(self.parse_int("a number after 'offset'")?);
                }
                _ => break,
            }
        }

        Ok(stmt)
    }

    fn parse_get(&mut self) -> ParseResult<GetStmt> {
        self.advance();
        let entity = self.parse_entity()?;
        let id = self.parse_literal("an id after the entity name")?;
        let include = if self.at(TokenKind::Include) {
            self.advance();
            Some(self.parse_path_list("an edge name")?)
        } else {
            None
        };
        Ok(GetStmt {
            entity,
            id,
            include,
        })
    }

    fn parse_count(&mut self) -> ParseResult<CountStmt> {
        self.advance();
        let entity = self.parse_entity()?;
        let filter = if self.at(TokenKind::Where) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(CountStmt { entity, filter })
    }

    fn parse_create(&mut self) -> ParseResult<CreateStmt> {
        self.advance();
        let entity = self.parse_entity()?;
        self.expect(TokenKind::Set, "'set' followed by field assignments")?;
        let assignments = self.parse_assignments()?;
        Ok(CreateStmt {
            entity,
            assignments,
        })
    }

    fn parse_update(&mut self) -> ParseResult<UpdateStmt> {
        self.advance();
        let entity = self.parse_entity()?;
        let id = self.parse_literal("an id after the entity name")?;
        self.expect(TokenKind::Set, "'set' followed by field assignments")?;
        let assignments = self.parse_assignments()?;
        Ok(UpdateStmt {
            entity,
            id,
            assignments,
        })
    }

    fn parse_delete(&mut self) -> ParseResult<DeleteStmt> {
        self.advance();
        let entity = self.parse_entity()?;
        let id = self.parse_literal("an id after the entity name")?;
        Ok(DeleteStmt { entity, id })
    }

    fn parse_meta(&mut self) -> ParseResult<MetaStmt> {
        let tok = self.advance();
        if tok.literal.is_empty() {
            return Err(ParseError::new("expected a meta-command name after ':'", tok.pos));
        }

        let mut args = Vec::new();
        while !self.at_meta_end(tok.pos.line) {
            let arg = self.advance();
            match arg.kind {
                TokenKind::Flag => args.push(format!("--{}", arg.literal)),
                _ => args.push(arg.literal.clone()),
            }
        }

        Ok(MetaStmt {
            name: tok.literal.to_ascii_lowercase(),
            args,
            pos: tok.pos,
        })
    }

    fn parse_path(&mut self, expected: &str) -> ParseResult<Path> {
        let first = self.expect_name(expected)?;
        let mut path = Path {
            segments: vec![first.literal.clone()],
            pos: first.pos,
        };
        while self.at(TokenKind::Dot) {
            self.advance();
            let seg = self.expect_name("a name after '.'")?;
            path.segments.push(seg.literal.clone());
        }
        Ok(path)
    }

    fn parse_path_list(&mut self, expected: &str) -> ParseResult<Vec<Path>> {
        let mut paths = vec![self.parse_path(expected)?];
        while self.at(TokenKind::Comma) {
            self.advance();
            paths.push(self.parse_path(expected)?);
        }
        Ok(paths)
    }

    fn parse_order_terms(&mut self) -> ParseResult<Vec<OrderTerm>> {
        let mut terms = Vec::new();
        loop {
            let path = self.parse_path("a field name in 'order by'")?;
            let desc = match self.kind() {
                TokenKind::Desc => {
                    self.advance();
                    true
                }
                TokenKind::Asc => {
                    self.advance();
                    false
                }
                _ => false,
            };
            terms.push(OrderTerm { path, desc });
            if !self.at(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(terms)
    }

    fn parse_assignments(&mut self) -> ParseResult<Vec<Assignment>> {
        let mut out = Vec::new();
        loop {
            let path = self.parse_path("a field name")?;
            self.expect(TokenKind::Eq, "'=' in assignment")?;
            let value = self.parse_literal("a value")?;
            out.push(Assignment { path, value });
            if !self.at(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(out)
    }

    fn parse_int(&mut self, expected: &str) -> ParseResult<Literal> {
        let tok = self.expect(TokenKind::Int, expected)?;
        Ok(Literal {
            kind: LiteralKind::Int,
            raw: tok.literal.clone(),
            pos: tok.pos,
        })
    }

    fn parse_literal(&mut self, expected: &str) -> ParseResult<Literal> {
        let kind = match self.kind() {
            TokenKind::String => LiteralKind::String,
            TokenKind::Int => LiteralKind::Int,
            TokenKind::Float => LiteralKind::Float,
            TokenKind::True | TokenKind::False => LiteralKind::Bool,
            TokenKind::Null => LiteralKind::Null,
            _ => return Err(self.error_here(expected)),
        };
        let tok = self.advance();
        let raw = match kind {
            LiteralKind::Bool | LiteralKind::Null => tok.literal.to_ascii_lowercase(),
            _ => tok.literal.clone(),
        };
        Ok(Literal {
            kind,
            raw,
            pos: tok.pos,
        })
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.at(TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Logic {
                op: LogicOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_not()?;
        while self.at(TokenKind::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::Logic {
                op: LogicOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.at(TokenKind::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        if self.at(TokenKind::LParen) {
            self.advance();
            let inner = self.parse_expr()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(inner);
        }

        let path = self.parse_path("a field name or '('")?;
        let op = match self.kind() {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Neq => CompareOp::Neq,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Gte => CompareOp::Gte,
            TokenKind::Lte => CompareOp::Lte,
            TokenKind::Like => CompareOp::Like,
            TokenKind::In => {
                self.advance();
                let values = self.parse_literal_list()?;
                return Ok(Expr::In { path, values });
            }
            _ => return Err(self.error_here(&format!("an operator after '{path}'"))),
        };
        self.advance();
        let value = self.parse_literal("a value")?;
        Ok(Expr::Compare { path, op, value })
    }

    fn parse_literal_list(&mut self) -> ParseResult<Vec<Literal>> {
        let open = self.expect(TokenKind::LBracket, "'[' after 'in'")?;
        let mut values = Vec::new();
        if !self.at(TokenKind::RBracket) {
            loop {
                values.push(self.parse_literal("a value in the list")?);
                if !self.at(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RBracket, "',' or ']'")?;
        if values.is_empty() {
            return Err(ParseError::new("'in' list must not be empty", open.pos));
        }
        Ok(values)
    }
}

fn reject_duplicate(already_set: bool, tok: &Token) -> ParseResult<()> {
    if already_set {
        let clause = match tok.kind {
            TokenKind::Order => "order by".to_string(),
            _ => tok.literal.to_ascii_lowercase(),
        };
        return Err(ParseError::new(format!("duplicate '{clause}' clause"), tok.pos));
    }
    Ok(())
}
