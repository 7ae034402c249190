//! PQL planner — resolves names against the registry, coerces literals, and
//! lowers statements into [`QueryPlan`]s.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::ast::*;
use crate::error::{PlanError, PlanResult};
use crate::plan::*;
use crate::schema::{EntitySchema, FieldKind, FieldMeta, Registry};
use crate::suggest::closest;
use crate::token::VERBS;
use crate::value::{parse_time, Value};

/// Row limit applied when a find has no `limit` clause.
pub const DEFAULT_LIMIT: usize = 100;

/// Largest accepted `limit`.
pub const MAX_LIMIT: usize = 10_000;

/// Topics accepted by `:help`, besides the verbs.
pub const HELP_TOPICS: &[&str] = &["operators", "meta"];

/// Lowers statements to plans against one registry.
pub struct Planner<'r> {
    registry: &'r Registry,
}

impl<'r> Planner<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn plan(&self, stmt: &Statement) -> PlanResult<QueryPlan> {
        match stmt {
            Statement::Find(s) => self.plan_find(s).map(QueryPlan::Find),
            Statement::Get(s) => self.plan_get(s).map(QueryPlan::Get),
            Statement::Count(s) => self.plan_count(s).map(QueryPlan::Count),
            Statement::Create(s) => self.plan_create(s).map(QueryPlan::Create),
            Statement::Update(s) => self.plan_update(s).map(QueryPlan::Update),
            Statement::Delete(s) => self.plan_delete(s).map(QueryPlan::Delete),
            Statement::Meta(s) => self.plan_meta(s).map(QueryPlan::Meta),
        }
    }

    fn plan_find(&self, stmt: &FindStmt) -> PlanResult<FindPlan> {
        let entity = self.resolve_entity(&stmt.entity.name)?;

        // Predicates
        let mut predicates = Vec::new();
        if let Some(filter) = &stmt.filter {
            self.flatten(entity, filter, &mut predicates)?;
        }

        // Projection
        let fields = match &stmt.select {
            Some(paths) => {
                let mut fields: Vec<String> = Vec::with_capacity(paths.len());
                for path in paths {
                    let field = self.queryable_field(entity, path)?;
                    if !fields.contains(&field.name) {
                        fields.push(field.name.clone());
                    }
                }
                fields
            }
            None => entity.default_projection(),
        };

        // Eager-loaded edges
        let edges = self.resolve_edges(entity, stmt.include.as_deref())?;

        // Ordering
        let mut order = Vec::new();
        for term in stmt.order_by.iter().flatten() {
            let field = self.queryable_field(entity, &term.path)?;
            order.push(OrderSpec {
                field: field.name.clone(),
                desc: term.desc,
            });
        }

        // Paging
        let limit = match &stmt.limit {
            Some(lit) => {
                let n = parse_count(lit, "limit")?;
                if n > MAX_LIMIT {
                    return Err(PlanError::InvalidClause {
                        clause: "limit".into(),
                        reason: format!("{n} exceeds the maximum of {MAX_LIMIT}"),
                    });
                }
                n
            }
            None => DEFAULT_LIMIT,
        };
        let offset = match &stmt.offset {
            Some(lit) => parse_count(lit, "offset")?,
            None => 0,
        };

        Ok(FindPlan {
            entity: entity.name.clone(),
            predicates,
            fields,
            edges,
            order,
            limit,
            offset,
        })
    }

    fn plan_get(&self, stmt: &GetStmt) -> PlanResult<GetPlan> {
        let entity = self.resolve_entity(&stmt.entity.name)?;
        Ok(GetPlan {
            entity: entity.name.clone(),
            id: self.coerce_id(entity, &stmt.id)?,
            fields: entity.default_projection(),
            edges: self.resolve_edges(entity, stmt.include.as_deref())?,
        })
    }

    fn plan_count(&self, stmt: &CountStmt) -> PlanResult<CountPlan> {
        let entity = self.resolve_entity(&stmt.entity.name)?;
        let mut predicates = Vec::new();
        if let Some(filter) = &stmt.filter {
            self.flatten(entity, filter, &mut predicates)?;
        }
        Ok(CountPlan {
            entity: entity.name.clone(),
            predicates,
        })
    }

    fn plan_create(&self, stmt: &CreateStmt) -> PlanResult<CreatePlan> {
        let entity = self.mutable_entity(&stmt.entity.name, "create")?;
        let values = self.assignments(entity, &stmt.assignments)?;

        let missing: Vec<String> = entity
            .required_fields()
            .into_iter()
            .filter(|name| !values.contains_key(*name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(PlanError::MissingRequired {
                entity: entity.name.clone(),
                fields: missing,
            });
        }

        Ok(CreatePlan {
            entity: entity.name.clone(),
            values,
            fields: entity.default_projection(),
        })
    }

    fn plan_update(&self, stmt: &UpdateStmt) -> PlanResult<UpdatePlan> {
        let entity = self.mutable_entity(&stmt.entity.name, "update")?;
        let id = self.coerce_id(entity, &stmt.id)?;
        let values = self.assignments(entity, &stmt.assignments)?;
        Ok(UpdatePlan {
            entity: entity.name.clone(),
            id,
            values,
            fields: entity.default_projection(),
        })
    }

    fn plan_delete(&self, stmt: &DeleteStmt) -> PlanResult<DeletePlan> {
        let entity = self.mutable_entity(&stmt.entity.name, "delete")?;
        Ok(DeletePlan {
            entity: entity.name.clone(),
            id: self.coerce_id(entity, &stmt.id)?,
        })
    }

    fn plan_meta(&self, stmt: &MetaStmt) -> PlanResult<MetaCommand> {
        let meta_err = |message: &str| PlanError::MetaArgument {
            command: format!(":{}", stmt.name),
            message: message.to_string(),
        };
        let no_args = |cmd: MetaCommand| {
            if stmt.args.is_empty() {
                Ok(cmd)
            } else {
                Err(meta_err("takes no arguments"))
            }
        };

        match stmt.name.as_str() {
            "help" => match stmt.args.as_slice() {
                [] => Ok(MetaCommand::Help { topic: None }),
                [topic] => {
                    let topic = topic.to_ascii_lowercase();
                    let known = VERBS.iter().chain(HELP_TOPICS).any(|t| *t == topic);
                    if known {
                        Ok(MetaCommand::Help { topic: Some(topic) })
                    } else {
                        let hint = closest(&topic, VERBS.iter().chain(HELP_TOPICS).copied())
                            .map(|s| format!(" (did you mean '{s}'?)"))
                            .unwrap_or_default();
                        Err(meta_err(&format!("no help topic '{topic}'{hint}")))
                    }
                }
                _ => Err(meta_err("usage: :help [topic]")),
            },
            "schema" => match stmt.args.as_slice() {
                [name] => {
                    let entity = self.resolve_entity(name)?;
                    Ok(MetaCommand::Schema {
                        entity: entity.name.clone(),
                    })
                }
                _ => Err(meta_err("usage: :schema <entity>")),
            },
            "history" => no_args(MetaCommand::History),
            "env" => no_args(MetaCommand::Env),
            "clear" => no_args(MetaCommand::Clear),
            "set" => match stmt.args.as_slice() {
                [name, value] if !name.starts_with("--") => Ok(MetaCommand::Set {
                    name: name.clone(),
                    value: value.clone(),
                }),
                _ => Err(meta_err("usage: :set <name> <value>")),
            },
            other => Err(PlanError::UnknownMetaCommand {
                name: other.to_string(),
                suggestion: closest(other, META_COMMANDS.iter().map(|(name, _)| *name)),
            }),
        }
    }

    fn resolve_entity(&self, name: &str) -> PlanResult<&'r EntitySchema> {
        self.registry
            .entity(name)
            .ok_or_else(|| PlanError::UnknownEntity {
                name: name.to_string(),
                suggestion: closest(name, self.registry.entity_names()),
            })
    }

    fn mutable_entity(&self, name: &str, verb: &str) -> PlanResult<&'r EntitySchema> {
        let entity = self.resolve_entity(name)?;
        if entity.immutable {
            return Err(PlanError::ImmutableEntity {
                entity: entity.name.clone(),
                verb: verb.to_string(),
            });
        }
        Ok(entity)
    }

    fn resolve_field(&self, entity: &'r EntitySchema, path: &Path) -> PlanResult<&'r FieldMeta> {
        if !path.is_simple() {
            return Err(PlanError::NestedPath {
                path: path.to_string(),
            });
        }
        entity
            .field(path.head())
            .ok_or_else(|| PlanError::UnknownField {
                entity: entity.name.clone(),
                name: path.head().to_string(),
                suggestion: closest(path.head(), entity.field_names()),
            })
    }

    /// A field usable in select, where, and order by.
    fn queryable_field(&self, entity: &'r EntitySchema, path: &Path) -> PlanResult<&'r FieldMeta> {
        let field = self.resolve_field(entity, path)?;
        if field.sensitive {
            return Err(PlanError::SensitiveField {
                field: field.name.clone(),
            });
        }
        Ok(field)
    }

    fn resolve_edges(&self, entity: &EntitySchema, paths: Option<&[Path]>) -> PlanResult<Vec<EdgeSpec>> {
        let mut edges: Vec<EdgeSpec> = Vec::new();
        for path in paths.unwrap_or_default() {
            if !path.is_simple() {
                return Err(PlanError::NestedPath {
                    path: path.to_string(),
                });
            }
            let edge = entity
                .edge(path.head())
                .ok_or_else(|| PlanError::UnknownEdge {
                    entity: entity.name.clone(),
                    name: path.head().to_string(),
                    suggestion: closest(path.head(), entity.edge_names()),
                })?;
            if edges.iter().all(|e| e.name != edge.name) {
                edges.push(EdgeSpec {
                    name: edge.name.clone(),
                    target: edge.target.clone(),
                    unique: edge.unique(),
                });
            }
        }
        Ok(edges)
    }

    /// AND chains become an ordered predicate list; OR and NOT are rejected.
    fn flatten(&self, entity: &'r EntitySchema, expr: &Expr, out: &mut Vec<PredicateSpec>) -> PlanResult<()> {
        match expr {
            Expr::Logic {
                op: LogicOp::And,
                left,
                right,
            } => {
                self.flatten(entity, left, out)?;
                self.flatten(entity, right, out)
            }
            Expr::Logic { op: LogicOp::Or, .. } => Err(PlanError::UnsupportedExpression {
                what: "'or'".into(),
            }),
            Expr::Not(_) => Err(PlanError::UnsupportedExpression {
                what: "'not'".into(),
            }),
            Expr::Compare { path, op, value } => {
                out.push(self.comparison(entity, path, *op, value)?);
                Ok(())
            }
            Expr::In { path, values } => {
                let field = self.queryable_field(entity, path)?;
                let values = values
                    .iter()
                    .map(|lit| coerce(field, lit))
                    .collect::<PlanResult<Vec<_>>>()?;
                out.push(PredicateSpec::list(field.name.clone(), values));
                Ok(())
            }
        }
    }

    fn comparison(
        &self,
        entity: &'r EntitySchema,
        path: &Path,
        op: CompareOp,
        lit: &Literal,
    ) -> PlanResult<PredicateSpec> {
        let field = self.queryable_field(entity, path)?;
        let unsupported = || PlanError::UnsupportedOperator {
            field: field.name.clone(),
            op: op.symbol().to_string(),
            kind: field.kind.to_string(),
        };

        if op.is_ordering() && !field.kind.is_comparable() {
            return Err(unsupported());
        }
        if op == CompareOp::Like && field.kind != FieldKind::String {
            return Err(unsupported());
        }

        let value = coerce(field, lit)?;
        if value.is_null() && (op.is_ordering() || op == CompareOp::Like) {
            return Err(PlanError::Coercion {
                field: field.name.clone(),
                reason: format!("null cannot be used with '{}'", op.symbol()),
            });
        }

        let op = match op {
            CompareOp::Eq => Operator::Eq,
            CompareOp::Neq => Operator::Neq,
            CompareOp::Gt => Operator::Gt,
            CompareOp::Lt => Operator::Lt,
            CompareOp::Gte => Operator::Gte,
            CompareOp::Lte => Operator::Lte,
            CompareOp::Like => Operator::Like,
        };
        Ok(PredicateSpec::single(field.name.clone(), op, value))
    }

    fn coerce_id(&self, entity: &EntitySchema, lit: &Literal) -> PlanResult<Value> {
        let field = entity.id_meta().ok_or_else(|| PlanError::UnknownField {
            entity: entity.name.clone(),
            name: entity.id_field.clone(),
            suggestion: None,
        })?;
        if lit.kind == LiteralKind::Null {
            return Err(PlanError::NullNotAllowed {
                field: field.name.clone(),
            });
        }
        coerce(field, lit)
    }

    fn assignments(&self, entity: &'r EntitySchema, items: &[Assignment]) -> PlanResult<BTreeMap<String, Value>> {
        let mut values = BTreeMap::new();
        for item in items {
            let field = self.resolve_field(entity, &item.path)?;
            if entity.is_computed(&field.name) {
                return Err(PlanError::ComputedField {
                    field: field.name.clone(),
                });
            }
            if values.contains_key(&field.name) {
                return Err(PlanError::DuplicateAssignment {
                    field: field.name.clone(),
                });
            }
            values.insert(field.name.clone(), coerce(field, &item.value)?);
        }
        Ok(values)
    }
}

fn parse_count(lit: &Literal, clause: &str) -> PlanResult<usize> {
    lit.raw.parse::<usize>().map_err(|_| PlanError::InvalidClause {
        clause: clause.to_string(),
        reason: format!("expected a non-negative integer, got {}", lit.raw),
    })
}

/// Coerce a literal to a field's type. This is the only place literals gain a type.
pub fn coerce(field: &FieldMeta, lit: &Literal) -> PlanResult<Value> {
    let mismatch = |expected: &str| PlanError::Coercion {
        field: field.name.clone(),
        reason: format!("expected {expected}, got {}", lit.describe()),
    };

    if lit.kind == LiteralKind::Null {
        return if field.optional {
            Ok(Value::Null)
        } else {
            Err(PlanError::NullNotAllowed {
                field: field.name.clone(),
            })
        };
    }

    match field.kind {
        FieldKind::String => match lit.kind {
            LiteralKind::String => Ok(Value::String(lit.raw.clone())),
            _ => Err(mismatch("a string")),
        },
        FieldKind::Int => {
            if lit.kind != LiteralKind::Int {
                return Err(mismatch("an integer"));
            }
            lit.raw
                .parse::<i32>()
                .map(|n| Value::Int(i64::from(n)))
                .map_err(|_| PlanError::Coercion {
                    field: field.name.clone(),
                    reason: format!("{} does not fit in a 32-bit integer", lit.raw),
                })
        }
        FieldKind::Int64 => {
            if lit.kind != LiteralKind::Int {
                return Err(mismatch("an integer"));
            }
            lit.raw.parse::<i64>().map(Value::Int).map_err(|_| PlanError::Coercion {
                field: field.name.clone(),
                reason: format!("{} does not fit in a 64-bit integer", lit.raw),
            })
        }
        FieldKind::Float => match lit.kind {
            LiteralKind::Int | LiteralKind::Float => lit
                .raw
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| mismatch("a number")),
            _ => Err(mismatch("a number")),
        },
        FieldKind::Bool => match lit.kind {
            LiteralKind::Bool => Ok(Value::Bool(lit.raw == "true")),
            _ => Err(mismatch("true or false")),
        },
        FieldKind::Time => match lit.kind {
            LiteralKind::String => parse_time(&lit.raw)
                .map(Value::Time)
                .ok_or_else(|| mismatch("an RFC 3339 timestamp or YYYY-MM-DD date")),
            _ => Err(mismatch("a quoted timestamp")),
        },
        FieldKind::Enum => {
            let declared = match lit.kind {
                LiteralKind::String => field.enum_value(&lit.raw),
                _ => None,
            };
            declared
                .map(|v| Value::String(v.to_string()))
                .ok_or_else(|| PlanError::InvalidEnumValue {
                    field: field.name.clone(),
                    value: lit.raw.clone(),
                    allowed: field.enum_values.clone(),
                })
        }
        FieldKind::Uuid => {
            // Only the canonical hyphenated form is accepted.
            if lit.kind != LiteralKind::String || lit.raw.len() != 36 {
                return Err(mismatch("a hyphenated UUID string"));
            }
            Uuid::parse_str(&lit.raw)
                .map(Value::Uuid)
                .map_err(|_| mismatch("a hyphenated UUID string"))
        }
        FieldKind::Json => Ok(Value::Json(literal_json(lit))),
    }
}

fn literal_json(lit: &Literal) -> serde_json::Value {
    match lit.kind {
        LiteralKind::String => serde_json::Value::String(lit.raw.clone()),
        LiteralKind::Int => lit
            .raw
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(lit.raw.clone())),
        LiteralKind::Float => lit
            .raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(lit.raw.clone())),
        LiteralKind::Bool => serde_json::Value::Bool(lit.raw == "true"),
        LiteralKind::Null => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::sample::sample_registry;

    fn plan(input: &str) -> PlanResult<QueryPlan> {
        let registry = sample_registry();
        let out = parse_str(input);
        assert!(!out.has_errors(), "syntax errors in {input:?}: {:?}", out.parse_errors);
        Planner::new(&registry).plan(&out.statements[0])
    }

    fn find(input: &str) -> FindPlan {
        match plan(input).unwrap() {
            QueryPlan::Find(p) => p,
            other => panic!("expected find plan, got {other:?}"),
        }
    }

    fn err(input: &str) -> String {
        plan(input).unwrap_err().to_string()
    }

    #[test]
    fn test_and_chain_flattens_in_order() {
        let p = find("find lease where status = \"active\" and lease_type = \"fixed_term\"");
        assert_eq!(p.predicates.len(), 2);
        assert_eq!(p.predicates[0].field, "status");
        assert_eq!(p.predicates[0].op, Operator::Eq);
        assert_eq!(p.predicates[1].field, "lease_type");
        assert_eq!(p.predicates[1].op, Operator::Eq);
    }

    #[test]
    fn test_select_projection() {
        let p = find("find lease select status, lease_type");
        assert_eq!(p.fields, vec!["status", "lease_type"]);
    }

    #[test]
    fn test_get_with_literal_id() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        match plan(&format!("get lease \"{id}\"")).unwrap() {
            QueryPlan::Get(g) => {
                assert_eq!(g.id, Value::Uuid(Uuid::parse_str(id).unwrap()));
                assert!(g.edges.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_order_limit_offset() {
        let p = find("find lease order by base_rent_amount_cents desc limit 25 offset 50");
        assert_eq!(
            p.order,
            vec![OrderSpec {
                field: "base_rent_amount_cents".into(),
                desc: true
            }]
        );
        assert_eq!(p.limit, 25);
        assert_eq!(p.offset, 50);
    }

    #[test]
    fn test_unknown_entity_without_close_match() {
        let msg = err("find unicorn");
        assert!(msg.contains("unknown entity"));
        assert!(!msg.contains("did you mean"));
    }

    #[test]
    fn test_unknown_entity_suggestion_cutoff() {
        assert!(err("find leas").contains("did you mean 'lease'?"));
        assert!(err("find lxxxe").contains("did you mean 'lease'?"));
        assert!(!err("find xxxxe").contains("did you mean"));
    }

    #[test]
    fn test_clause_order_does_not_change_plan() {
        let a = plan("find lease where status = \"active\" limit 5").unwrap();
        let b = plan("find lease limit 5 where status = \"active\"").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_planning_is_idempotent() {
        let registry = sample_registry();
        let out = parse_str("find lease where base_rent_amount_cents >= 100000 include tenant order by start_date");
        let planner = Planner::new(&registry);
        let first = planner.plan(&out.statements[0]).unwrap();
        let second = planner.plan(&out.statements[0]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_enum_values_validated_and_canonicalized() {
        let msg = err("find lease where status = \"bogus\"");
        assert!(msg.contains("pending, active, ended, terminated"), "{msg}");

        let p = find("find lease where status = \"ACTIVE\"");
        assert_eq!(
            p.predicates[0].value,
            PredicateValue::Single(Value::String("active".into()))
        );
    }

    #[test]
    fn test_eq_and_in_round_trip() {
        let p = find("find tenant where name = \"v\"");
        assert_eq!(p.predicates.len(), 1);
        assert_eq!(p.predicates[0].op, Operator::Eq);
        assert_eq!(p.predicates[0].value, PredicateValue::Single(Value::String("v".into())));

        let p = find("find lease where status in [\"active\", \"ended\"]");
        assert_eq!(p.predicates.len(), 1);
        assert_eq!(p.predicates[0].op, Operator::In);
        match &p.predicates[0].value {
            PredicateValue::List(values) => assert_eq!(values.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_immutable_entity_rejects_mutations() {
        assert!(err("create audit_event set action = \"x\", actor = \"y\"").contains("immutable"));
        assert!(err("update audit_event 1 set action = \"x\"").contains("immutable"));
        assert!(err("delete audit_event 1").contains("immutable"));
    }

    #[test]
    fn test_operator_type_discipline() {
        assert!(err("find lease where status > \"active\"").contains("operator '>'"));
        assert!(err("find lease where base_rent_amount_cents like \"1%\"").contains("operator 'like'"));
        assert!(plan("find lease where start_date >= \"2024-01-01\"").is_ok());
        assert!(plan("find tenant where email like \"%@example.com\"").is_ok());
    }

    #[test]
    fn test_or_and_not_are_rejected() {
        assert!(err("find lease where status = \"active\" or status = \"ended\"").contains("'or'"));
        assert!(err("find lease where not status = \"active\"").contains("'not'"));
    }

    #[test]
    fn test_nested_paths_rejected() {
        assert!(err("find lease where tenant.name = \"x\"").contains("nested traversal 'tenant.name'"));
    }

    #[test]
    fn test_field_and_edge_suggestions() {
        assert!(err("find lease where stauts = \"active\"").contains("did you mean 'status'?"));
        assert!(err("find lease include tenat").contains("did you mean 'tenant'?"));
    }

    #[test]
    fn test_coercion_failures_name_the_field() {
        assert!(err("find property where unit_count = 3000000000").contains("unit_count"));
        assert!(err("get lease \"not-a-uuid\"").contains("'id'"));
        assert!(err("find lease where start_date = \"yesterday\"").contains("start_date"));
        assert!(err("find lease where status = null").contains("not optional"));
        assert!(plan("find lease where notes = null").is_ok());
    }

    #[test]
    fn test_sensitive_fields() {
        let p = find("find tenant");
        assert!(!p.fields.contains(&"tax_id".to_string()));
        assert!(err("find tenant select tax_id").contains("sensitive"));
        assert!(err("find tenant where tax_id = \"1\"").contains("sensitive"));
        assert!(err("find tenant order by tax_id").contains("sensitive"));
    }

    #[test]
    fn test_defaults_and_limit_bounds() {
        let p = find("find lease");
        assert_eq!(p.limit, DEFAULT_LIMIT);
        assert_eq!(p.offset, 0);
        assert_eq!(p.fields, sample_registry().entity("lease").unwrap().default_projection());
        assert!(err("find lease limit 10001").contains("exceeds the maximum"));
        assert!(err("find lease limit -1").contains("non-negative"));
    }

    #[test]
    fn test_mutation_guards() {
        assert!(err("update lease \"550e8400-e29b-41d4-a716-446655440000\" set id = \"x\"")
            .contains("computed, cannot be set"));
        assert!(err("update lease \"550e8400-e29b-41d4-a716-446655440000\" set created_at = \"2024-01-01\"")
            .contains("computed, cannot be set"));
        assert!(err("update lease \"550e8400-e29b-41d4-a716-446655440000\" set notes = \"a\", notes = \"b\"")
            .contains("more than once"));
        let msg = err("create tenant set name = \"Ann\"");
        assert!(msg.contains("missing required fields") && msg.contains("email"), "{msg}");
    }

    #[test]
    fn test_create_plan_values() {
        match plan("create tenant set name = \"Ann\", email = \"ann@example.com\"").unwrap() {
            QueryPlan::Create(c) => {
                assert_eq!(c.entity, "tenant");
                assert_eq!(c.values.get("name"), Some(&Value::String("Ann".into())));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_keyword_named_fields_resolve() {
        let registry = Registry::new().with_entity(
            EntitySchema::new("ticket")
                .with_field(FieldMeta::new("id", FieldKind::Int64))
                .with_field(FieldMeta::new("order", FieldKind::Int))
                .with_field(FieldMeta::new("count", FieldKind::Int)),
        );
        let out = parse_str("find ticket where order > 1 select count order by order desc");
        assert!(!out.has_errors(), "{:?}", out.parse_errors);
        let QueryPlan::Find(p) = Planner::new(&registry).plan(&out.statements[0]).unwrap() else {
            panic!("expected find plan");
        };
        assert_eq!(p.predicates[0].field, "order");
        assert_eq!(p.fields, vec!["count".to_string()]);
        assert_eq!(p.order[0].field, "order");
        assert!(p.order[0].desc);
    }

    #[test]
    fn test_meta_commands() {
        assert_eq!(
            plan(":schema LEASE").unwrap(),
            QueryPlan::Meta(MetaCommand::Schema {
                entity: "lease".into()
            })
        );
        assert!(err(":schema leese").contains("did you mean 'lease'?"));
        assert!(err(":histroy").contains("did you mean 'history'?"));
        assert!(err(":schema").contains("usage"));
        assert_eq!(
            plan(":help find").unwrap(),
            QueryPlan::Meta(MetaCommand::Help {
                topic: Some("find".into())
            })
        );
        assert_eq!(
            plan(":set page_size 20").unwrap(),
            QueryPlan::Meta(MetaCommand::Set {
                name: "page_size".into(),
                value: "20".into()
            })
        );
        assert!(err(":clear now").contains("takes no arguments"));
        assert_eq!(
            plan(":help delete").unwrap(),
            QueryPlan::Meta(MetaCommand::Help {
                topic: Some("delete".into())
            })
        );
    }
}
