//! Error types for every stage of the PQL pipeline.

use crate::token::Position;

/// Render an optional fuzzy suggestion as a trailing hint.
pub fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{s}'?)"),
        None => String::new(),
    }
}

/// Lexing problems. Collected, never fatal to tokenization.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: Position },

    #[error("unterminated string literal starting at {pos}")]
    UnterminatedString { pos: Position },
}

impl LexError {
    pub fn pos(&self) -> Position {
        match self {
            LexError::UnexpectedChar { pos, .. } | LexError::UnterminatedString { pos } => *pos,
        }
    }
}

/// A position-tagged syntax error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at {pos}")]
pub struct ParseError {
    pub message: String,
    pub pos: Position,
}

impl ParseError {
    pub fn new(message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

/// Schema-level failures found while lowering an AST into a plan.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("unknown entity '{name}'{}", did_you_mean(.suggestion))]
    UnknownEntity {
        name: String,
        suggestion: Option<String>,
    },

    #[error("unknown field '{name}' on entity '{entity}'{}", did_you_mean(.suggestion))]
    UnknownField {
        entity: String,
        name: String,
        suggestion: Option<String>,
    },

    #[error("unknown edge '{name}' on entity '{entity}'{}", did_you_mean(.suggestion))]
    UnknownEdge {
        entity: String,
        name: String,
        suggestion: Option<String>,
    },

    #[error("nested traversal '{path}' is not supported yet")]
    NestedPath { path: String },

    #[error("operator '{op}' is not supported for field '{field}' of type {kind}")]
    UnsupportedOperator {
        field: String,
        op: String,
        kind: String,
    },

    #[error("invalid value '{value}' for enum field '{field}' (valid values: {})", .allowed.join(", "))]
    InvalidEnumValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("invalid value for field '{field}': {reason}")]
    Coercion { field: String, reason: String },

    #[error("field '{field}' is not optional and cannot be null")]
    NullNotAllowed { field: String },

    #[error("field '{field}' is sensitive and cannot be used in queries")]
    SensitiveField { field: String },

    #[error("{what} is not supported yet in where clauses; combine conditions with 'and'")]
    UnsupportedExpression { what: String },

    #[error("entity '{entity}' is immutable; '{verb}' is not allowed")]
    ImmutableEntity { entity: String, verb: String },

    #[error("field '{field}' is computed, cannot be set")]
    ComputedField { field: String },

    #[error("field '{field}' is assigned more than once")]
    DuplicateAssignment { field: String },

    #[error("missing required fields for '{entity}': {}", .fields.join(", "))]
    MissingRequired { entity: String, fields: Vec<String> },

    #[error("invalid {clause}: {reason}")]
    InvalidClause { clause: String, reason: String },

    #[error("unknown meta-command ':{name}'{}", did_you_mean(.suggestion))]
    UnknownMetaCommand {
        name: String,
        suggestion: Option<String>,
    },

    #[error("{command}: {message}")]
    MetaArgument { command: String, message: String },
}

/// Failures reported while running a plan against the data adaptors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("adaptor error: {0}")]
    Adaptor(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("entity '{entity}' does not support mutations")]
    ReadOnly { entity: String },

    #[error("invalid transition for '{field}': '{from}' -> '{to}'")]
    InvalidTransition {
        field: String,
        from: String,
        to: String,
    },

    #[error("no adaptor registered for entity '{0}'")]
    MissingAdaptor(String),

    #[error("{0} cannot be executed by the data executor")]
    Unsupported(&'static str),
}

impl ExecError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExecError::NotFound { .. })
    }
}

/// Problems loading or validating a schema registry.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid registry: {0}")]
    Invalid(String),
}

pub type PlanResult<T> = Result<T, PlanError>;
pub type ExecResult<T> = Result<T, ExecError>;
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_rendering() {
        let err = PlanError::UnknownEntity {
            name: "leas".into(),
            suggestion: Some("lease".into()),
        };
        assert_eq!(err.to_string(), "unknown entity 'leas' (did you mean 'lease'?)");

        let err = PlanError::UnknownEntity {
            name: "unicorn".into(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "unknown entity 'unicorn'");
    }

    #[test]
    fn test_enum_error_lists_values() {
        let err = PlanError::InvalidEnumValue {
            field: "status".into(),
            value: "bogus".into(),
            allowed: vec!["active".into(), "ended".into()],
        };
        assert!(err.to_string().contains("active, ended"));
    }
}
