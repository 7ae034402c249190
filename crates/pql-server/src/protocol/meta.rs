//! Meta-commands (`:help`, `:schema`, `:history`, `:env`, `:clear`, `:set`).
//!
//! These never reach the executor; they read the registry or the caller's
//! session and answer with ordinary rows so clients render them like any
//! other result.

use serde_json::{json, Value as Json};

use pql::plan::META_COMMANDS;
use pql::{EntitySchema, MetaCommand, PlanError, Registry, Row};

use crate::session::Session;
use crate::types::ServerResult;

/// Session variable overriding the rows-per-frame batch size.
pub const BATCH_SIZE_VAR: &str = "batch_size";

const MAX_BATCH_SIZE: usize = 10_000;

const VERB_USAGE: &[(&str, &str)] = &[
    (
        "find",
        "find <entity> [where <expr>] [select f1,f2] [include e1,e2] [order by f [asc|desc]] [limit n] [offset n]",
    ),
    ("get", "get <entity> \"<id>\" [include e1,e2]"),
    ("count", "count <entity> [where <expr>]"),
    ("create", "create <entity> set f=v[,f=v...]"),
    ("update", "update <entity> \"<id>\" set f=v[,f=v...]"),
    ("delete", "delete <entity> \"<id>\""),
];

const OPERATOR_USAGE: &[(&str, &str)] = &[
    ("=", "equal"),
    ("!=", "not equal"),
    (">", "greater than"),
    ("<", "less than"),
    (">=", "greater than or equal"),
    ("<=", "less than or equal"),
    ("like", "case-insensitive match; % matches any run, _ one character"),
    ("in", "membership in a list: field in [\"a\", \"b\"]"),
    ("and", "both conditions hold"),
    ("or", "either condition holds (not supported at the top level yet)"),
    ("not", "negation (not supported at the top level yet)"),
];

/// Rows produced by a meta-command.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaOutput {
    /// Pseudo-entity name, e.g. `:history`.
    pub entity: String,
    pub fields: Vec<String>,
    pub rows: Vec<Row>,
}

impl MetaOutput {
    fn new(command: &MetaCommand, fields: &[&str], rows: Vec<Row>) -> Self {
        Self {
            entity: format!(":{}", command.name()),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            rows,
        }
    }
}

fn row(value: Json) -> Row {
    match value {
        Json::Object(map) => map,
        _ => Row::new(),
    }
}

fn usage_rows(table: &[(&str, &str)]) -> Vec<Row> {
    table
        .iter()
        .map(|(name, usage)| row(json!({ "name": name, "usage": usage })))
        .collect()
}

/// Run a meta-command against the registry and the caller's session.
pub fn run(command: &MetaCommand, registry: &Registry, session: &mut Session) -> ServerResult<MetaOutput> {
    let output = match command {
        MetaCommand::Help { topic } => {
            let rows = match topic.as_deref() {
                None => {
                    let mut rows = usage_rows(VERB_USAGE);
                    rows.extend(META_COMMANDS.iter().map(|(name, desc)| {
                        row(json!({ "name": format!(":{name}"), "usage": desc }))
                    }));
                    rows
                }
                Some("operators") => usage_rows(OPERATOR_USAGE),
                Some("meta") => META_COMMANDS
                    .iter()
                    .map(|(name, desc)| row(json!({ "name": format!(":{name}"), "usage": desc })))
                    .collect(),
                Some(verb) => usage_rows(
                    &VERB_USAGE
                        .iter()
                        .copied()
                        .filter(|(name, _)| *name == verb)
                        .collect::<Vec<_>>(),
                ),
            };
            MetaOutput::new(command, &["name", "usage"], rows)
        }

        MetaCommand::Schema { entity } => {
            let rows = registry.entity(entity).map(describe_entity).unwrap_or_default();
            MetaOutput::new(command, &["name", "kind", "optional", "detail"], rows)
        }

        MetaCommand::History => {
            let rows = session
                .history()
                .enumerate()
                .map(|(i, entry)| {
                    row(json!({
                        "n": i + 1,
                        "pql": entry.pql,
                        "at": pql::value::format_time(&entry.at),
                    }))
                })
                .collect();
            MetaOutput::new(command, &["n", "pql", "at"], rows)
        }

        MetaCommand::Env => {
            let mut rows = vec![
                row(json!({ "name": "session_id", "value": session.id })),
                row(json!({ "name": "mode", "value": session.mode.as_str() })),
                row(json!({ "name": "created_at", "value": pql::value::format_time(&session.created_at) })),
                row(json!({ "name": "history", "value": session.history_len().to_string() })),
            ];
            rows.extend(
                session
                    .variables()
                    .iter()
                    .map(|(name, value)| row(json!({ "name": name, "value": value }))),
            );
            MetaOutput::new(command, &["name", "value"], rows)
        }

        MetaCommand::Clear => {
            let cleared = session.clear_history();
            MetaOutput::new(command, &["cleared"], vec![row(json!({ "cleared": cleared }))])
        }

        MetaCommand::Set { name, value } => {
            if name == BATCH_SIZE_VAR {
                parse_batch_size(value)?;
            }
            session.set_var(name.clone(), value.clone());
            MetaOutput::new(
                command,
                &["name", "value"],
                vec![row(json!({ "name": name, "value": value }))],
            )
        }
    };
    Ok(output)
}

fn parse_batch_size(value: &str) -> ServerResult<usize> {
    match value.parse::<usize>() {
        Ok(n) if (1..=MAX_BATCH_SIZE).contains(&n) => Ok(n),
        _ => Err(PlanError::MetaArgument {
            command: ":set".into(),
            message: format!("{BATCH_SIZE_VAR} must be an integer between 1 and {MAX_BATCH_SIZE}"),
        }
        .into()),
    }
}

/// Batch size for a session: its `batch_size` variable, else `default`.
pub fn batch_size(session: &Session, default: usize) -> usize {
    session
        .var(BATCH_SIZE_VAR)
        .and_then(|v| parse_batch_size(v).ok())
        .unwrap_or(default)
        .max(1)
}

fn describe_entity(entity: &EntitySchema) -> Vec<Row> {
    let mut rows: Vec<Row> = entity
        .fields
        .iter()
        .map(|f| {
            let mut detail = Vec::new();
            if f.name == entity.id_field {
                detail.push("id".to_string());
            }
            if entity.is_computed(&f.name) {
                detail.push("computed".to_string());
            }
            if f.sensitive {
                detail.push("sensitive".to_string());
            }
            if !f.enum_values.is_empty() {
                detail.push(format!("values: {}", f.enum_values.join(", ")));
            }
            if let Some(states) = entity.transitions.get(&f.name) {
                let arrows: Vec<String> = states
                    .iter()
                    .map(|(from, to)| format!("{from} -> {}", to.join("|")))
                    .collect();
                detail.push(format!("transitions: {}", arrows.join("; ")));
            }
            row(json!({
                "name": f.name,
                "kind": f.kind.name(),
                "optional": f.optional,
                "detail": detail.join("; "),
            }))
        })
        .collect();

    rows.extend(entity.edges.iter().map(|e| {
        row(json!({
            "name": e.name,
            "kind": "edge",
            "optional": true,
            "detail": format!("-> {} ({})", e.target, cardinality_name(e)),
        }))
    }));
    rows
}

fn cardinality_name(edge: &pql::EdgeMeta) -> String {
    serde_json::to_value(edge.cardinality)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AccessMode;
    use pql::sample::sample_registry;

    fn session() -> Session {
        Session::new(AccessMode::ReadWrite)
    }

    #[test]
    fn test_help_lists_verbs_and_meta() {
        let out = run(&MetaCommand::Help { topic: None }, &sample_registry(), &mut session()).unwrap();
        assert_eq!(out.entity, ":help");
        assert_eq!(out.rows.len(), VERB_USAGE.len() + META_COMMANDS.len());

        let out = run(
            &MetaCommand::Help {
                topic: Some("count".into()),
            },
            &sample_registry(),
            &mut session(),
        )
        .unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0]["name"], "count");
    }

    #[test]
    fn test_schema_describes_fields_and_edges() {
        let out = run(
            &MetaCommand::Schema {
                entity: "lease".into(),
            },
            &sample_registry(),
            &mut session(),
        )
        .unwrap();
        let status = out.rows.iter().find(|r| r["name"] == "status").unwrap();
        assert_eq!(status["kind"], "enum");
        assert!(status["detail"].as_str().unwrap().contains("pending -> active|terminated"));
        let tenant = out.rows.iter().find(|r| r["name"] == "tenant").unwrap();
        assert_eq!(tenant["kind"], "edge");
        assert_eq!(tenant["detail"], "-> tenant (m2o)");
    }

    #[test]
    fn test_history_and_clear() {
        let registry = sample_registry();
        let mut s = session();
        s.record("count lease");
        s.record("find tenant");
        let out = run(&MetaCommand::History, &registry, &mut s).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[1]["pql"], "find tenant");

        let out = run(&MetaCommand::Clear, &registry, &mut s).unwrap();
        assert_eq!(out.rows[0]["cleared"], 2);
        assert_eq!(s.history_len(), 0);
    }

    #[test]
    fn test_set_and_env() {
        let registry = sample_registry();
        let mut s = session();
        let set = MetaCommand::Set {
            name: "batch_size".into(),
            value: "25".into(),
        };
        run(&set, &registry, &mut s).unwrap();
        assert_eq!(batch_size(&s, 100), 25);

        let env = run(&MetaCommand::Env, &registry, &mut s).unwrap();
        assert!(env.rows.iter().any(|r| r["name"] == "batch_size" && r["value"] == "25"));
        assert!(env.rows.iter().any(|r| r["name"] == "mode" && r["value"] == "read_write"));
    }

    #[test]
    fn test_bad_batch_size_rejected() {
        let mut s = session();
        let set = MetaCommand::Set {
            name: "batch_size".into(),
            value: "0".into(),
        };
        let err = run(&set, &sample_registry(), &mut s).unwrap_err();
        assert_eq!(err.code(), "plan_error");
        assert_eq!(batch_size(&s, 100), 100);
    }
}
