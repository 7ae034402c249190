//! Context-aware autocomplete.
//!
//! Only the text before the cursor is re-lexed. The last token decides the
//! mode: if it is a word ending exactly at the cursor the user is still
//! typing it and it becomes the filter prefix; otherwise the previous token
//! is complete and the next category is offered unfiltered.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::LexError;
use crate::lexer::tokenize;
use crate::plan::META_COMMANDS;
use crate::planner::HELP_TOPICS;
use crate::schema::{EntitySchema, FieldKind, FieldMeta, Registry};
use crate::token::{Token, TokenKind, VERBS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Verb,
    Entity,
    Field,
    Edge,
    Operator,
    Value,
    Keyword,
    Meta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub kind: SuggestionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Text to insert when it differs from the label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_text: Option<String>,
}

impl Suggestion {
    fn new(label: impl Into<String>, kind: SuggestionKind) -> Self {
        Self {
            label: label.into(),
            kind,
            detail: None,
            insert_text: None,
        }
    }

    fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn insert(mut self, text: impl Into<String>) -> Self {
        self.insert_text = Some(text.into());
        self
    }
}

const FIND_CLAUSES: &[(TokenKind, &str)] = &[
    (TokenKind::Where, "where"),
    (TokenKind::Select, "select"),
    (TokenKind::Include, "include"),
    (TokenKind::Order, "order by"),
    (TokenKind::Limit, "limit"),
    (TokenKind::Offset, "offset"),
];

fn keyword(label: &str) -> Suggestion {
    Suggestion::new(label, SuggestionKind::Keyword)
}

fn keywords(labels: &[&str]) -> Vec<Suggestion> {
    labels.iter().map(|l| keyword(l)).collect()
}

/// Autocomplete engine over one registry. Does no I/O.
pub struct Completer<'r> {
    registry: &'r Registry,
}

impl<'r> Completer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    /// Suggestions for `text` with the cursor at byte offset `cursor`.
    pub fn complete(&self, text: &str, cursor: usize) -> Vec<Suggestion> {
        let mut cursor = cursor.min(text.len());
        while !text.is_char_boundary(cursor) {
            cursor -= 1;
        }
        let prefix = &text[..cursor];

        let (mut tokens, errors) = tokenize(prefix);
        tokens.pop();

        let Some(last) = tokens.last() else {
            return self.statement_starters();
        };
        let touching = last.end == cursor;

        if touching && last.kind == TokenKind::MetaCommand {
            return filter(self.meta_commands(), &last.literal);
        }

        if touching && last.kind == TokenKind::String {
            let unterminated = errors
                .iter()
                .any(|e| matches!(e, LexError::UnterminatedString { pos } if *pos == last.pos));
            if !unterminated {
                // cursor sits on the closing quote
                return Vec::new();
            }
            let ctx = &tokens[..tokens.len() - 1];
            let values = self
                .analyze(ctx)
                .into_iter()
                .filter(|s| s.kind == SuggestionKind::Value)
                .map(|s| Suggestion {
                    insert_text: None,
                    ..s
                })
                .collect();
            return filter(values, &last.literal);
        }

        if touching && last.kind.is_word() {
            let ctx = &tokens[..tokens.len() - 1];
            return filter(self.analyze(ctx), &last.literal);
        }

        if touching && last.kind.is_literal() {
            return Vec::new();
        }

        self.analyze(&tokens)
    }

    /// Candidates for the position right after `ctx`.
    fn analyze(&self, ctx: &[Token]) -> Vec<Suggestion> {
        let boundary = ctx
            .iter()
            .rposition(|t| t.kind == TokenKind::Semicolon || t.kind.starts_statement());
        let stmt = match boundary {
            Some(i) if ctx[i].kind == TokenKind::Semicolon => &ctx[i + 1..],
            Some(i) => &ctx[i..],
            None => ctx,
        };

        let Some(head) = stmt.first() else {
            return self.statement_starters();
        };

        if head.kind == TokenKind::MetaCommand {
            return self.meta_arguments(&head.literal.to_ascii_lowercase(), &stmt[1..]);
        }
        if !head.kind.is_verb() {
            return Vec::new();
        }
        if stmt.len() == 1 {
            return self.entities();
        }

        let Some(entity) = self.registry.entity(&stmt[1].literal) else {
            return Vec::new();
        };
        let rest = &stmt[2..];

        match head.kind {
            TokenKind::Find => self.query_clauses(entity, rest, true),
            TokenKind::Count => self.query_clauses(entity, rest, false),
            TokenKind::Get => self.get_clauses(entity, rest),
            TokenKind::Create => match rest.split_first() {
                None => vec![keyword("set")],
                Some((set, tail)) if set.kind == TokenKind::Set => self.assignments(entity, tail),
                Some(_) => Vec::new(),
            },
            TokenKind::Update => match rest {
                [] => Vec::new(),
                [_id] => vec![keyword("set")],
                [_id, set, tail @ ..] if set.kind == TokenKind::Set => self.assignments(entity, tail),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn statement_starters(&self) -> Vec<Suggestion> {
        let mut out: Vec<Suggestion> = VERBS
            .iter()
            .map(|v| Suggestion::new(*v, SuggestionKind::Verb))
            .collect();
        out.extend(self.meta_commands().into_iter().map(|s| {
            let label = format!(":{}", s.label);
            Suggestion { label, ..s }
        }));
        out
    }

    fn meta_commands(&self) -> Vec<Suggestion> {
        META_COMMANDS
            .iter()
            .map(|(name, detail)| Suggestion::new(*name, SuggestionKind::Meta).detail(*detail))
            .collect()
    }

    fn meta_arguments(&self, name: &str, args: &[Token]) -> Vec<Suggestion> {
        if !args.is_empty() {
            return Vec::new();
        }
        match name {
            "schema" => self.entities(),
            "help" => VERBS
                .iter()
                .chain(HELP_TOPICS)
                .map(|t| keyword(t))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn entities(&self) -> Vec<Suggestion> {
        self.registry
            .entities()
            .map(|e| {
                let mut detail = format!("{} fields", e.fields.len());
                if e.immutable {
                    detail.push_str(", read-only");
                }
                Suggestion::new(e.name.clone(), SuggestionKind::Entity).detail(detail)
            })
            .collect()
    }

    fn fields<'e>(&self, fields: impl Iterator<Item = &'e FieldMeta>) -> Vec<Suggestion> {
        fields
            .map(|f| {
                let mut detail = f.kind.to_string();
                if f.optional {
                    detail.push('?');
                }
                Suggestion::new(f.name.clone(), SuggestionKind::Field).detail(detail)
            })
            .collect()
    }

    fn queryable_fields(&self, entity: &EntitySchema) -> Vec<Suggestion> {
        self.fields(entity.fields.iter().filter(|f| !f.sensitive))
    }

    fn edges(&self, entity: &EntitySchema, used: &HashSet<String>) -> Vec<Suggestion> {
        entity
            .edges
            .iter()
            .filter(|e| !used.contains(&e.name.to_ascii_lowercase()))
            .map(|e| {
                let shape = if e.unique() { "one" } else { "many" };
                Suggestion::new(e.name.clone(), SuggestionKind::Edge)
                    .detail(format!("{} ({shape})", e.target))
            })
            .collect()
    }

    fn operators(&self, field: &FieldMeta) -> Vec<Suggestion> {
        let mut ops = vec!["=", "!="];
        if field.kind.is_comparable() {
            ops.extend([">", "<", ">=", "<="]);
        }
        if field.kind == FieldKind::String {
            ops.push("like");
        }
        ops.push("in");
        ops.into_iter()
            .map(|op| Suggestion::new(op, SuggestionKind::Operator).detail(field.kind.to_string()))
            .collect()
    }

    fn values(&self, field: &FieldMeta) -> Vec<Suggestion> {
        let mut out: Vec<Suggestion> = match field.kind {
            FieldKind::Enum => field
                .enum_values
                .iter()
                .map(|v| {
                    Suggestion::new(v.clone(), SuggestionKind::Value)
                        .detail(field.name.clone())
                        .insert(format!("\"{v}\""))
                })
                .collect(),
            FieldKind::Bool => vec![
                Suggestion::new("true", SuggestionKind::Value),
                Suggestion::new("false", SuggestionKind::Value),
            ],
            _ => Vec::new(),
        };
        if field.optional {
            out.push(Suggestion::new("null", SuggestionKind::Value));
        }
        out
    }

    fn field_named(&self, entity: &'r EntitySchema, tok: Option<&Token>) -> Option<&'r FieldMeta> {
        let tok = tok.filter(|t| t.kind == TokenKind::Ident)?;
        entity.field(&tok.literal)
    }

    fn query_clauses(&self, entity: &'r EntitySchema, rest: &[Token], is_find: bool) -> Vec<Suggestion> {
        let mut clause: Option<TokenKind> = None;
        let mut used: HashSet<TokenKind> = HashSet::new();
        let mut depth = 0i32;
        let mut included: HashSet<String> = HashSet::new();
        for tok in rest {
            match tok.kind {
                TokenKind::Where
                | TokenKind::Select
                | TokenKind::Include
                | TokenKind::Order
                | TokenKind::Limit
                | TokenKind::Offset => {
                    clause = Some(tok.kind);
                    used.insert(tok.kind);
                }
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => depth -= 1,
                TokenKind::Ident if clause == Some(TokenKind::Include) => {
                    included.insert(tok.literal.to_ascii_lowercase());
                }
                _ => {}
            }
        }

        let next_clauses = || -> Vec<Suggestion> {
            FIND_CLAUSES
                .iter()
                .filter(|(kind, _)| is_find || *kind == TokenKind::Where)
                .filter(|(kind, _)| !used.contains(kind))
                .map(|(_, label)| keyword(label))
                .collect()
        };
        let after_condition = || {
            let mut out = vec![keyword("and")];
            out.extend(next_clauses());
            out
        };

        let Some(last) = rest.last() else {
            return next_clauses();
        };
        let prev = rest.len().checked_sub(2).and_then(|i| rest.get(i));

        match last.kind {
            TokenKind::Where | TokenKind::And | TokenKind::Or | TokenKind::Not | TokenKind::LParen => {
                self.queryable_fields(entity)
            }
            TokenKind::Select | TokenKind::By => self.queryable_fields(entity),
            TokenKind::Include => self.edges(entity, &included),
            TokenKind::Order => vec![keyword("by")],
            TokenKind::Comma => match clause {
                Some(TokenKind::Select) | Some(TokenKind::Order) => self.queryable_fields(entity),
                Some(TokenKind::Include) => self.edges(entity, &included),
                Some(TokenKind::Where) if depth > 0 => self
                    .in_list_field(entity, rest)
                    .map(|f| self.values(f))
                    .unwrap_or_default(),
                _ => Vec::new(),
            },
            TokenKind::Ident => match clause {
                Some(TokenKind::Where) => {
                    let in_predicate_position = prev.is_some_and(|p| {
                        matches!(
                            p.kind,
                            TokenKind::Where
                                | TokenKind::And
                                | TokenKind::Or
                                | TokenKind::Not
                                | TokenKind::LParen
                        )
                    });
                    match self.field_named(entity, Some(last)) {
                        Some(field) if in_predicate_position => self.operators(field),
                        _ => Vec::new(),
                    }
                }
                Some(TokenKind::Select) | Some(TokenKind::Include) => next_clauses(),
                Some(TokenKind::Order) => {
                    let mut out = keywords(&["asc", "desc"]);
                    out.extend(next_clauses());
                    out
                }
                _ => Vec::new(),
            },
            k if k.is_comparison() || k == TokenKind::Like => self
                .field_named(entity, prev)
                .map(|f| self.values(f))
                .unwrap_or_default(),
            TokenKind::LBracket => self
                .in_list_field(entity, rest)
                .map(|f| self.values(f))
                .unwrap_or_default(),
            k if k.is_literal() => {
                if depth > 0 {
                    Vec::new()
                } else if clause == Some(TokenKind::Where) {
                    after_condition()
                } else {
                    next_clauses()
                }
            }
            TokenKind::RParen | TokenKind::RBracket => after_condition(),
            TokenKind::Asc | TokenKind::Desc => next_clauses(),
            _ => Vec::new(),
        }
    }

    /// The field on the left of the innermost open `in [`.
    fn in_list_field(&self, entity: &'r EntitySchema, rest: &[Token]) -> Option<&'r FieldMeta> {
        let idx = rest.iter().rposition(|t| t.kind == TokenKind::In)?;
        self.field_named(entity, idx.checked_sub(1).and_then(|i| rest.get(i)))
    }

    fn get_clauses(&self, entity: &EntitySchema, rest: &[Token]) -> Vec<Suggestion> {
        let included: HashSet<String> = rest
            .iter()
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| t.literal.to_ascii_lowercase())
            .collect();
        match rest {
            [] => Vec::new(),
            [id] if id.kind.is_literal() => vec![keyword("include")],
            [_, .., last] if matches!(last.kind, TokenKind::Include | TokenKind::Comma) => {
                self.edges(entity, &included)
            }
            _ => Vec::new(),
        }
    }

    fn assignments(&self, entity: &'r EntitySchema, tail: &[Token]) -> Vec<Suggestion> {
        let assigned: HashSet<String> = tail
            .windows(2)
            .filter(|w| w[0].kind == TokenKind::Ident && w[1].kind == TokenKind::Eq)
            .map(|w| w[0].literal.to_ascii_lowercase())
            .collect();

        match tail.last().map(|t| t.kind) {
            None | Some(TokenKind::Comma) => self.fields(entity.fields.iter().filter(|f| {
                !entity.is_computed(&f.name) && !assigned.contains(&f.name.to_ascii_lowercase())
            })),
            Some(TokenKind::Ident) => vec![Suggestion::new("=", SuggestionKind::Operator)],
            Some(TokenKind::Eq) => {
                let field = tail.len().checked_sub(2).and_then(|i| tail.get(i));
                self.field_named(entity, field)
                    .map(|f| self.values(f))
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }
}

/// Case-insensitive prefix filter. An empty prefix keeps everything.
fn filter(items: Vec<Suggestion>, prefix: &str) -> Vec<Suggestion> {
    if prefix.is_empty() {
        return items;
    }
    let prefix = prefix.to_lowercase();
    items
        .into_iter()
        .filter(|s| s.label.to_lowercase().starts_with(&prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::sample_registry;

    fn labels(text: &str) -> Vec<String> {
        let registry = sample_registry();
        Completer::new(&registry)
            .complete(text, text.len())
            .into_iter()
            .map(|s| s.label)
            .collect()
    }

    #[test]
    fn test_entity_prefix() {
        assert_eq!(labels("find le"), vec!["lease"]);
        assert_eq!(labels("find LE"), vec!["lease"]);
    }

    #[test]
    fn test_cursor_in_the_middle() {
        let registry = sample_registry();
        let text = "find le where status = \"active\"";
        let got: Vec<String> = Completer::new(&registry)
            .complete(text, 7)
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(got, vec!["lease"]);
    }

    #[test]
    fn test_verbs_at_start() {
        let got = labels("");
        assert!(got.contains(&"find".to_string()));
        assert!(got.contains(&":help".to_string()));
        assert_eq!(labels("co"), vec!["count"]);
        assert_eq!(labels("find lease; up"), vec!["update"]);
    }

    #[test]
    fn test_entities_after_verb() {
        let got = labels("count ");
        assert_eq!(got, vec!["audit_event", "lease", "property", "tenant"]);
    }

    #[test]
    fn test_fields_after_where_exclude_sensitive() {
        let got = labels("find tenant where ");
        assert!(got.contains(&"email".to_string()));
        assert!(!got.contains(&"tax_id".to_string()));
        assert_eq!(labels("find lease where st"), vec!["status", "start_date"]);
        assert_eq!(labels("find lease where status = \"active\" and lease"), vec!["lease_type"]);
    }

    #[test]
    fn test_operators_respect_field_kind() {
        let enum_ops = labels("find lease where status ");
        assert!(enum_ops.contains(&"=".to_string()));
        assert!(!enum_ops.contains(&">".to_string()));
        assert!(!enum_ops.contains(&"like".to_string()));

        let num_ops = labels("find lease where base_rent_amount_cents ");
        assert!(num_ops.contains(&">=".to_string()));

        let str_ops = labels("find tenant where email ");
        assert!(str_ops.contains(&"like".to_string()));
    }

    #[test]
    fn test_enum_values_after_operator_and_in_list() {
        assert_eq!(
            labels("find lease where status = "),
            vec!["pending", "active", "ended", "terminated"]
        );
        assert_eq!(labels("find lease where lease_type in ["), vec!["fixed_term", "month_to_month", "commercial"]);
        assert_eq!(
            labels("find lease where lease_type in [\"commercial\", "),
            vec!["fixed_term", "month_to_month", "commercial"]
        );
    }

    #[test]
    fn test_inside_unterminated_string() {
        let registry = sample_registry();
        let text = "find lease where status = \"ac";
        let got = Completer::new(&registry).complete(text, text.len());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].label, "active");
        assert_eq!(got[0].insert_text, None);
    }

    #[test]
    fn test_closing_quote_suppresses_keywords() {
        assert!(labels("find lease where status = \"active\"").is_empty());
        let after = labels("find lease where status = \"active\" ");
        assert!(after.contains(&"and".to_string()));
        assert!(after.contains(&"limit".to_string()));
        assert!(!after.contains(&"where".to_string()));
    }

    #[test]
    fn test_used_clauses_are_omitted() {
        let got = labels("find lease limit 5 ");
        assert!(!got.contains(&"limit".to_string()));
        assert!(got.contains(&"order by".to_string()));
        assert_eq!(labels("count lease "), vec!["where"]);
        assert_eq!(labels("find lease wh"), vec!["where"]);
    }

    #[test]
    fn test_order_by_and_select() {
        assert_eq!(labels("find lease order "), vec!["by"]);
        assert!(labels("find lease order by ").contains(&"start_date".to_string()));
        let after_field = labels("find lease order by start_date ");
        assert!(after_field.contains(&"desc".to_string()));
        assert!(labels("find lease select status, ").contains(&"lease_type".to_string()));
    }

    #[test]
    fn test_edges_after_include() {
        assert_eq!(labels("find lease include "), vec!["tenant", "property"]);
        assert_eq!(labels("find lease include tenant, "), vec!["property"]);
        assert_eq!(labels("get lease \"x\" "), vec!["include"]);
        assert_eq!(labels("get lease \"x\" include "), vec!["tenant", "property"]);
    }

    #[test]
    fn test_mutation_fields() {
        assert_eq!(labels("create tenant "), vec!["set"]);
        let got = labels("create tenant set ");
        assert!(got.contains(&"name".to_string()));
        assert!(!got.contains(&"id".to_string()));
        assert!(!got.contains(&"created_at".to_string()));

        let got = labels("create tenant set name = \"a\", ");
        assert!(!got.contains(&"name".to_string()));
        assert!(got.contains(&"email".to_string()));

        assert_eq!(labels("update lease \"x\" "), vec!["set"]);
        assert!(labels("update lease \"x\" set status = ").contains(&"ended".to_string()));
    }

    #[test]
    fn test_meta_commands() {
        assert_eq!(labels(":he"), vec!["help"]);
        assert_eq!(labels(":"), vec!["help", "schema", "history", "env", "clear", "set"]);
        assert_eq!(labels(":schema te"), vec!["tenant"]);
    }

    #[test]
    fn test_unknown_entity_yields_nothing() {
        assert!(labels("find unicorn where ").is_empty());
    }

    #[test]
    fn test_cursor_clamped_to_char_boundary() {
        let registry = sample_registry();
        let text = "find lé";
        // byte 7 is inside 'é'
        let got = Completer::new(&registry).complete(text, 7);
        assert!(got.is_empty() || got.iter().all(|s| s.kind == SuggestionKind::Entity));
    }
}
