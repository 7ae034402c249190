//! Abstract syntax tree for PQL statements.
//!
//! The parser is syntax-only: literals keep their raw text and a type tag,
//! and names are kept as written. Resolution and coercion belong to the planner.

use serde::{Deserialize, Serialize};

use crate::token::Position;

/// A name as written in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub pos: Position,
}

/// A dot-separated field or edge reference, e.g. `tenant.email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub segments: Vec<String>,
    pub pos: Position,
}

impl Path {
    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }

    /// The first segment; for simple paths, the whole name.
    pub fn head(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Syntactic type of a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralKind {
    String,
    Int,
    Float,
    Bool,
    Null,
}

/// A literal value with its raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Literal {
    pub kind: LiteralKind,
    /// Raw text; for strings, the unescaped contents.
    pub raw: String,
    pub pos: Position,
}

impl Literal {
    /// Short description for error messages, e.g. `string "x"` or `int 5`.
    pub fn describe(&self) -> String {
        match self.kind {
            LiteralKind::String => format!("string \"{}\"", self.raw),
            LiteralKind::Int => format!("int {}", self.raw),
            LiteralKind::Float => format!("float {}", self.raw),
            LiteralKind::Bool => format!("bool {}", self.raw),
            LiteralKind::Null => "null".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
            CompareOp::Like => "like",
        }
    }

    /// Ordering operators, valid only on comparable field kinds.
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Gt | CompareOp::Lt | CompareOp::Gte | CompareOp::Lte
        )
    }
}

/// Where-clause expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Logic {
        op: LogicOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Compare {
        path: Path,
        op: CompareOp,
        value: Literal,
    },
    In {
        path: Path,
        values: Vec<Literal>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub path: Path,
    pub desc: bool,
}

/// `field = literal` inside a `set` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub path: Path,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindStmt {
    pub entity: Ident,
    pub filter: Option<Expr>,
    pub select: Option<Vec<Path>>,
    pub include: Option<Vec<Path>>,
    pub order_by: Option<Vec<OrderTerm>>,
    pub limit: Option<Literal>,
    pub offset: Option<Literal>,
}

impl FindStmt {
    pub fn new(entity: Ident) -> Self {
        Self {
            entity,
            filter: None,
            select: None,
            include: None,
            order_by: None,
            limit: None,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStmt {
    pub entity: Ident,
    pub id: Literal,
    pub include: Option<Vec<Path>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountStmt {
    pub entity: Ident,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStmt {
    pub entity: Ident,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStmt {
    pub entity: Ident,
    pub id: Literal,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStmt {
    pub entity: Ident,
    pub id: Literal,
}

/// `:name args...` — args keep their token text; flags keep their `--` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaStmt {
    pub name: String,
    pub args: Vec<String>,
    pub pos: Position,
}

/// One parsed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    Find(FindStmt),
    Get(GetStmt),
    Count(CountStmt),
    Create(CreateStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    Meta(MetaStmt),
}

impl Statement {
    /// Verb (or `:name`) used for logging and history.
    pub fn verb(&self) -> &str {
        match self {
            Statement::Find(_) => "find",
            Statement::Get(_) => "get",
            Statement::Count(_) => "count",
            Statement::Create(_) => "create",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
            Statement::Meta(m) => &m.name,
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Statement::Create(_) | Statement::Update(_) | Statement::Delete(_)
        )
    }
}
