//! QueryPlan — the validated, schema-resolved form handed to the executor.
//!
//! Plans carry resolved names and coerced values only, so nothing downstream
//! needs to consult the registry again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Meta-commands with their one-line descriptions.
pub const META_COMMANDS: &[(&str, &str)] = &[
    ("help", "show help for a verb or topic"),
    ("schema", "describe an entity's fields and edges"),
    ("history", "list statements executed in this session"),
    ("env", "show session settings and variables"),
    ("clear", "clear the session history"),
    ("set", "set a session variable"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    In,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Like => "like",
            Operator::In => "in",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateValue {
    Single(Value),
    List(Vec<Value>),
}

/// One flattened where-clause condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateSpec {
    pub field: String,
    pub op: Operator,
    pub value: PredicateValue,
}

impl PredicateSpec {
    pub fn single(field: impl Into<String>, op: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value: PredicateValue::Single(value),
        }
    }

    pub fn list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op: Operator::In,
            value: PredicateValue::List(values),
        }
    }
}

/// An edge to eager-load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub name: String,
    pub target: String,
    /// Unique edges load as a single object, others as an array.
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub field: String,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindPlan {
    pub entity: String,
    pub predicates: Vec<PredicateSpec>,
    pub fields: Vec<String>,
    pub edges: Vec<EdgeSpec>,
    pub order: Vec<OrderSpec>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPlan {
    pub entity: String,
    pub id: Value,
    pub fields: Vec<String>,
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountPlan {
    pub entity: String,
    pub predicates: Vec<PredicateSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePlan {
    pub entity: String,
    pub values: BTreeMap<String, Value>,
    /// Projection applied to the created row.
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub entity: String,
    pub id: Value,
    pub values: BTreeMap<String, Value>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePlan {
    pub entity: String,
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MetaCommand {
    Help { topic: Option<String> },
    Schema { entity: String },
    History,
    Env,
    Clear,
    Set { name: String, value: String },
}

impl MetaCommand {
    pub fn name(&self) -> &'static str {
        match self {
            MetaCommand::Help { .. } => "help",
            MetaCommand::Schema { .. } => "schema",
            MetaCommand::History => "history",
            MetaCommand::Env => "env",
            MetaCommand::Clear => "clear",
            MetaCommand::Set { .. } => "set",
        }
    }
}

/// Output of the planner, one variant per statement kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum QueryPlan {
    Find(FindPlan),
    Get(GetPlan),
    Count(CountPlan),
    Create(CreatePlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
    Meta(MetaCommand),
}

impl QueryPlan {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryPlan::Find(_) => "find",
            QueryPlan::Get(_) => "get",
            QueryPlan::Count(_) => "count",
            QueryPlan::Create(_) => "create",
            QueryPlan::Update(_) => "update",
            QueryPlan::Delete(_) => "delete",
            QueryPlan::Meta(_) => "meta",
        }
    }

    /// Target entity; `None` for meta-commands.
    pub fn entity(&self) -> Option<&str> {
        match self {
            QueryPlan::Find(p) => Some(&p.entity),
            QueryPlan::Get(p) => Some(&p.entity),
            QueryPlan::Count(p) => Some(&p.entity),
            QueryPlan::Create(p) => Some(&p.entity),
            QueryPlan::Update(p) => Some(&p.entity),
            QueryPlan::Delete(p) => Some(&p.entity),
            QueryPlan::Meta(_) => None,
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            QueryPlan::Create(_) | QueryPlan::Update(_) | QueryPlan::Delete(_)
        )
    }

    /// Projected field names for plans that return rows.
    pub fn fields(&self) -> Option<&[String]> {
        match self {
            QueryPlan::Find(p) => Some(&p.fields),
            QueryPlan::Get(p) => Some(&p.fields),
            QueryPlan::Create(p) => Some(&p.fields),
            QueryPlan::Update(p) => Some(&p.fields),
            _ => None,
        }
    }
}
