//! Filter operators.
//!
//! The operator set is closed and the family is picked by name prefix.
//! Names outside it are kept:
//! - `date_*` names become [`FilterOperator::UnknownDate`] and fail as soon
//!   as an operand is given
//! - any other name becomes [`FilterOperator::Unknown`] and always passes
//!
//! Configuration loading warns about both.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operators that compare a normalized date against ISO operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOperator {
    Before,
    After,
    On,
    /// Inclusive on both ends, operand `start|end`.
    Between,
}

/// Operators working on text, emptiness or best-effort numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericOperator {
    Empty,
    NotEmpty,
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
}

/// A configured filter operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOperator {
    Date(DateOperator),
    Generic(GenericOperator),
    /// A `date_` name outside the known set. Fails unless the operand is empty.
    UnknownDate(String),
    /// Any other name outside the known set. Always evaluates to `true`.
    Unknown(String),
}

impl FilterOperator {
    pub fn parse(name: &str) -> Self {
        match name {
            "date_before" => Self::Date(DateOperator::Before),
            "date_after" => Self::Date(DateOperator::After),
            "date_on" => Self::Date(DateOperator::On),
            "date_between" => Self::Date(DateOperator::Between),
            "empty" => Self::Generic(GenericOperator::Empty),
            "not_empty" => Self::Generic(GenericOperator::NotEmpty),
            "equals" => Self::Generic(GenericOperator::Equals),
            "not_equals" => Self::Generic(GenericOperator::NotEquals),
            "contains" => Self::Generic(GenericOperator::Contains),
            "not_contains" => Self::Generic(GenericOperator::NotContains),
            "starts_with" => Self::Generic(GenericOperator::StartsWith),
            "ends_with" => Self::Generic(GenericOperator::EndsWith),
            "greater_than" => Self::Generic(GenericOperator::GreaterThan),
            "less_than" => Self::Generic(GenericOperator::LessThan),
            "greater_equal" => Self::Generic(GenericOperator::GreaterEqual),
            "less_equal" => Self::Generic(GenericOperator::LessEqual),
            other if other.starts_with("date_") => Self::UnknownDate(other.to_string()),
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Configuration name of the operator.
    pub fn name(&self) -> &str {
        match self {
            Self::Date(op) => match op {
                DateOperator::Before => "date_before",
                DateOperator::After => "date_after",
                DateOperator::On => "date_on",
                DateOperator::Between => "date_between",
            },
            Self::Generic(op) => match op {
                GenericOperator::Empty => "empty",
                GenericOperator::NotEmpty => "not_empty",
                GenericOperator::Equals => "equals",
                GenericOperator::NotEquals => "not_equals",
                GenericOperator::Contains => "contains",
                GenericOperator::NotContains => "not_contains",
                GenericOperator::StartsWith => "starts_with",
                GenericOperator::EndsWith => "ends_with",
                GenericOperator::GreaterThan => "greater_than",
                GenericOperator::LessThan => "less_than",
                GenericOperator::GreaterEqual => "greater_equal",
                GenericOperator::LessEqual => "less_equal",
            },
            Self::UnknownDate(name) | Self::Unknown(name) => name,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::UnknownDate(_) | Self::Unknown(_))
    }
}

impl From<String> for FilterOperator {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<FilterOperator> for String {
    fn from(op: FilterOperator) -> Self {
        op.name().to_string()
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
