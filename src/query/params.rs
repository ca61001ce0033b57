//! Parameter Binder
//!
//! Hands out positional placeholders in visitation order. The binder is the
//! only producer of placeholder text, so a constant can only reach the
//! fragment as `$n::type`.

use super::types::SqlType;
use super::value::Value;

/// A constant bound to a positional placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    /// 1-based position (`$index`)
    pub index: usize,
    pub value: Value,
    pub sql_type: SqlType,
}

impl BoundParameter {
    /// Placeholder as it appears in the fragment
    pub fn placeholder(&self) -> String {
        format!("${}::{}", self.index, self.sql_type.name())
    }
}

/// Assigns placeholders starting at a caller-chosen index
#[derive(Debug)]
pub struct ParameterBinder {
    next: usize,
    parameters: Vec<BoundParameter>,
}

impl ParameterBinder {
    /// `first` is the index of the first placeholder; positions below it are
    /// reserved by the caller
    pub fn new(first: usize) -> Self {
        Self {
            next: first.max(1),
            parameters: Vec::new(),
        }
    }

    /// Bind a value and return its typed placeholder
    pub fn bind(&mut self, value: Value, sql_type: SqlType) -> String {
        let param = BoundParameter {
            index: self.next,
            value,
            sql_type,
        };
        self.next += 1;
        let placeholder = param.placeholder();
        self.parameters.push(param);
        placeholder
    }

    /// Index the next bind would receive
    pub fn next_index(&self) -> usize {
        self.next
    }

    pub fn finish(self) -> Vec<BoundParameter> {
        self.parameters
    }
}
