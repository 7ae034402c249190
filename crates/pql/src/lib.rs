//! PQL — a small query language over schema-described entities.
//!
//! Text flows one way: [`lexer`] → [`parser`] → [`planner`] → [`executor`].
//! The [`complete`] engine shares the same [`schema::Registry`] for
//! suggestions.

pub mod ast;
pub mod complete;
pub mod error;
pub mod executor;
pub mod lexer;
pub mod memory;
pub mod parser;
pub mod plan;
pub mod planner;
pub mod sample;
pub mod schema;
pub mod suggest;
pub mod token;
pub mod value;

pub use ast::Statement;
pub use complete::{Completer, Suggestion, SuggestionKind};
pub use error::{ExecError, LexError, ParseError, PlanError, RegistryError};
pub use executor::{Adaptor, CancelToken, DispatchTable, ExecOutput, Executor, Query, Row};
pub use lexer::tokenize;
pub use memory::MemoryStore;
pub use parser::{parse, parse_str, ParseOutput};
pub use plan::{MetaCommand, QueryPlan};
pub use planner::Planner;
pub use schema::{Cardinality, EdgeMeta, EntitySchema, FieldKind, FieldMeta, Registry};
pub use token::{Position, Token, TokenKind};
pub use value::Value;
