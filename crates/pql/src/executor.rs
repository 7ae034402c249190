//! PQL executor — dispatches query plans to per-entity data adaptors.
//!
//! The executor is stateless: it owns no data and performs no schema
//! lookups. Everything it needs is in the plan and the dispatch table.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};

use crate::error::{ExecError, ExecResult, RegistryError, RegistryResult};
use crate::plan::*;
use crate::schema::Registry;
use crate::value::Value;

/// A result row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Cooperative cancellation flag shared between a request and its execution.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once tripped.
    pub fn check(&self) -> ExecResult<()> {
        if self.is_cancelled() {
            Err(ExecError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Chainable query description handed to [`Adaptor::all`] and [`Adaptor::count`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Query {
    pub predicates: Vec<PredicateSpec>,
    pub edges: Vec<EdgeSpec>,
    pub order: Vec<OrderSpec>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Empty means every column.
    pub fields: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: PredicateSpec) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.order.push(OrderSpec {
            field: field.into(),
            desc,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&FindPlan> for Query {
    fn from(plan: &FindPlan) -> Self {
        let query = plan
            .predicates
            .iter()
            .cloned()
            .fold(Query::new(), Query::filter);
        let query = plan.edges.iter().cloned().fold(query, Query::with_edge);
        plan.order
            .iter()
            .fold(query, |q, o| q.order_by(o.field.clone(), o.desc))
            .limit(plan.limit)
            .offset(plan.offset)
            .select(plan.fields.iter().cloned())
    }
}

impl From<&CountPlan> for Query {
    fn from(plan: &CountPlan) -> Self {
        plan.predicates
            .iter()
            .cloned()
            .fold(Query::new(), Query::filter)
    }
}

/// Per-entity data access.
///
/// Adaptors check the cancel token between row batches. Mutations default to
/// [`ExecError::ReadOnly`].
pub trait Adaptor: Send + Sync {
    /// Entity this adaptor serves.
    fn entity(&self) -> &str;

    fn get(&self, id: &Value, edges: &[EdgeSpec], cancel: &CancelToken) -> ExecResult<Option<Row>>;

    fn all(&self, query: &Query, cancel: &CancelToken) -> ExecResult<Vec<Row>>;

    fn count(&self, query: &Query, cancel: &CancelToken) -> ExecResult<u64>;

    fn create(&self, _values: &BTreeMap<String, Value>, _cancel: &CancelToken) -> ExecResult<Row> {
        Err(ExecError::ReadOnly {
            entity: self.entity().to_string(),
        })
    }

    fn update(
        &self,
        _id: &Value,
        _values: &BTreeMap<String, Value>,
        _cancel: &CancelToken,
    ) -> ExecResult<Option<Row>> {
        Err(ExecError::ReadOnly {
            entity: self.entity().to_string(),
        })
    }

    /// Returns `false` when no row had that id.
    fn delete(&self, _id: &Value, _cancel: &CancelToken) -> ExecResult<bool> {
        Err(ExecError::ReadOnly {
            entity: self.entity().to_string(),
        })
    }
}

/// Entity name to adaptor, built once at startup.
#[derive(Clone, Default)]
pub struct DispatchTable {
    adaptors: HashMap<String, Arc<dyn Adaptor>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adaptor: Arc<dyn Adaptor>) {
        self.adaptors.insert(adaptor.entity().to_string(), adaptor);
    }

    pub fn get(&self, entity: &str) -> Option<&Arc<dyn Adaptor>> {
        self.adaptors.get(entity)
    }

    pub fn len(&self) -> usize {
        self.adaptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adaptors.is_empty()
    }

    /// Check that the table serves exactly the registry's entities.
    pub fn verify(&self, registry: &Registry) -> RegistryResult<()> {
        let registered: BTreeSet<&str> = self.adaptors.keys().map(String::as_str).collect();
        let declared: BTreeSet<&str> = registry.entity_names().collect();

        let missing: Vec<&str> = declared.difference(&registered).copied().collect();
        let unknown: Vec<&str> = registered.difference(&declared).copied().collect();
        if missing.is_empty() && unknown.is_empty() {
            return Ok(());
        }

        let mut problems = Vec::new();
        if !missing.is_empty() {
            problems.push(format!("no adaptor for: {}", missing.join(", ")));
        }
        if !unknown.is_empty() {
            problems.push(format!("adaptors for undeclared entities: {}", unknown.join(", ")));
        }
        Err(RegistryError::Invalid(problems.join("; ")))
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.adaptors.keys().collect();
        names.sort();
        f.debug_struct("DispatchTable").field("entities", &names).finish()
    }
}

/// What a plan produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecOutput {
    Rows {
        entity: String,
        fields: Vec<String>,
        rows: Vec<Row>,
    },
    Entity {
        entity: String,
        row: Row,
    },
    Count {
        entity: String,
        count: u64,
    },
    Created {
        entity: String,
        row: Row,
    },
    Updated {
        entity: String,
        row: Row,
    },
    Deleted {
        entity: String,
        id: serde_json::Value,
    },
}

impl ExecOutput {
    pub fn entity(&self) -> &str {
        match self {
            ExecOutput::Rows { entity, .. }
            | ExecOutput::Entity { entity, .. }
            | ExecOutput::Count { entity, .. }
            | ExecOutput::Created { entity, .. }
            | ExecOutput::Updated { entity, .. }
            | ExecOutput::Deleted { entity, .. } => entity,
        }
    }

    /// Row count, or the counted total for `count`.
    pub fn total(&self) -> u64 {
        match self {
            ExecOutput::Rows { rows, .. } => rows.len() as u64,
            ExecOutput::Count { count, .. } => *count,
            _ => 1,
        }
    }

    /// Rows to stream back; a count yields none.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            ExecOutput::Rows { rows, .. } => rows,
            ExecOutput::Entity { row, .. }
            | ExecOutput::Created { row, .. }
            | ExecOutput::Updated { row, .. } => vec![row],
            ExecOutput::Deleted { id, .. } => {
                let mut row = Row::new();
                row.insert("id".into(), id);
                row.insert("deleted".into(), serde_json::Value::Bool(true));
                vec![row]
            }
            ExecOutput::Count { .. } => Vec::new(),
        }
    }
}

/// Keep only the listed columns plus any loaded edges.
pub fn project(mut row: Row, fields: &[String], edges: &[EdgeSpec]) -> Row {
    if fields.is_empty() {
        return row;
    }
    row.retain(|key, _| fields.iter().any(|f| f == key) || edges.iter().any(|e| &e.name == key));
    row
}

/// Runs plans against a dispatch table.
pub struct Executor<'d> {
    dispatch: &'d DispatchTable,
}

impl<'d> Executor<'d> {
    pub fn new(dispatch: &'d DispatchTable) -> Self {
        Self { dispatch }
    }

    pub fn execute(&self, plan: &QueryPlan, cancel: &CancelToken) -> ExecResult<ExecOutput> {
        cancel.check()?;
        debug!(plan = plan.kind(), entity = plan.entity().unwrap_or("-"), "executing plan");

        match plan {
            QueryPlan::Find(p) => {
                let rows = self.adaptor(&p.entity)?.all(&Query::from(p), cancel)?;
                Ok(ExecOutput::Rows {
                    entity: p.entity.clone(),
                    fields: p.fields.clone(),
                    rows,
                })
            }
            QueryPlan::Get(p) => {
                let row = self
                    .adaptor(&p.entity)?
                    .get(&p.id, &p.edges, cancel)?
                    .ok_or_else(|| not_found(&p.entity, &p.id))?;
                Ok(ExecOutput::Entity {
                    entity: p.entity.clone(),
                    row: project(row, &p.fields, &p.edges),
                })
            }
            QueryPlan::Count(p) => {
                let count = self.adaptor(&p.entity)?.count(&Query::from(p), cancel)?;
                Ok(ExecOutput::Count {
                    entity: p.entity.clone(),
                    count,
                })
            }
            QueryPlan::Create(p) => {
                let row = self.adaptor(&p.entity)?.create(&p.values, cancel)?;
                Ok(ExecOutput::Created {
                    entity: p.entity.clone(),
                    row: project(row, &p.fields, &[]),
                })
            }
            QueryPlan::Update(p) => {
                let row = self
                    .adaptor(&p.entity)?
                    .update(&p.id, &p.values, cancel)?
                    .ok_or_else(|| not_found(&p.entity, &p.id))?;
                Ok(ExecOutput::Updated {
                    entity: p.entity.clone(),
                    row: project(row, &p.fields, &[]),
                })
            }
            QueryPlan::Delete(p) => {
                if !self.adaptor(&p.entity)?.delete(&p.id, cancel)? {
                    return Err(not_found(&p.entity, &p.id));
                }
                Ok(ExecOutput::Deleted {
                    entity: p.entity.clone(),
                    id: p.id.to_json(),
                })
            }
            QueryPlan::Meta(_) => Err(ExecError::Unsupported("meta-commands")),
        }
    }

    fn adaptor(&self, entity: &str) -> ExecResult<&'d Arc<dyn Adaptor>> {
        self.dispatch.get(entity).ok_or_else(|| {
            error!(entity, "planned entity has no registered adaptor");
            ExecError::MissingAdaptor(entity.to_string())
        })
    }
}

fn not_found(entity: &str, id: &Value) -> ExecError {
    let id = match id {
        Value::String(s) => s.clone(),
        other => other.to_json().to_string().trim_matches('"').to_string(),
    };
    ExecError::NotFound {
        entity: entity.to_string(),
        id,
    }
}
