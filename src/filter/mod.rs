//! Record filtering.
//!
//! Records flow through:
//! 1. `evaluate()`: one predicate against one field value
//! 2. `RecordSelector::matches_filters()`: AND/OR composition
//! 3. `RecordSelector::select()`: composition plus the dispatch gate
//!    (key field present, not already sent unless forced)

pub mod evaluate;
pub mod operator;
pub mod selector;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use evaluate::evaluate;
pub use operator::{DateOperator, FilterOperator, GenericOperator};
pub use selector::{RecordSelector, Selection, SelectionStats};

/// One configured predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Field name the predicate reads.
    pub column: String,
    pub operator: FilterOperator,
    /// Comparison operand. `start|end` for `date_between`.
    #[serde(default, deserialize_with = "crate::config::string_or_number")]
    pub value: String,
}

impl FilterSpec {
    pub fn new(column: &str, operator: FilterOperator, value: &str) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value: value.to_string(),
        }
    }
}

/// How per-predicate results combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterLogic {
    #[default]
    And,
    Or,
}

impl FilterLogic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl TryFrom<String> for FilterLogic {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(format!("unknown filter logic '{other}', expected AND or OR")),
        }
    }
}

impl From<FilterLogic> for String {
    fn from(logic: FilterLogic) -> Self {
        logic.as_str().to_string()
    }
}

impl fmt::Display for FilterLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
