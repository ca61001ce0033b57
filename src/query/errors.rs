//! # Query Errors
//!
//! Error types for predicate parsing and compilation. Every variant is raised
//! before the backing store is contacted.

use thiserror::Error;

/// Result type for predicate operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Predicate compile errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A node, member or method outside the supported vocabulary
    #[error("Unsupported expression: {construct}: {reason}")]
    UnsupportedExpression { construct: String, reason: String },

    /// `@name` referenced without a binding
    #[error("Unbound capture: @{0}")]
    UnboundCapture(String),

    /// Predicate text could not be parsed
    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
}

impl QueryError {
    pub fn unsupported(construct: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::UnsupportedExpression {
            construct: construct.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        QueryError::Parse {
            offset,
            message: message.into(),
        }
    }

    /// The construct named by an unsupported-expression error
    pub fn construct(&self) -> Option<&str> {
        match self {
            QueryError::UnsupportedExpression { construct, .. } => Some(construct),
            _ => None,
        }
    }

    /// Stable code used by the CLI error envelope
    pub fn code_str(&self) -> &'static str {
        match self {
            QueryError::UnsupportedExpression { .. } => "PGKV_QUERY_UNSUPPORTED",
            QueryError::UnboundCapture(_) => "PGKV_QUERY_UNBOUND_CAPTURE",
            QueryError::Parse { .. } => "PGKV_QUERY_PARSE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_names_construct() {
        let err = QueryError::unsupported("method 'Trim'", "not in the predicate vocabulary");
        assert_eq!(err.construct(), Some("method 'Trim'"));
        assert!(err.to_string().contains("Trim"));
        assert_eq!(err.code_str(), "PGKV_QUERY_UNSUPPORTED");
    }

    #[test]
    fn test_parse_error_display() {
        let err = QueryError::parse(7, "expected ')'");
        assert_eq!(err.to_string(), "Parse error at offset 7: expected ')'");
        assert_eq!(err.construct(), None);
    }
}
