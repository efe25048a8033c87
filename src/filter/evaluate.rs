//! Single-predicate evaluation.

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::dates::{normalize_date, parse_iso_operand};
use crate::filter::FilterSpec;
use crate::filter::operator::{DateOperator, FilterOperator, GenericOperator};
use crate::record::{FieldValue, Record};

/// Value a number coercion falls back to when nothing numeric is found.
pub const NUMERIC_DEFAULT: f64 = 0.0;

/// Evaluate one filter against one record.
pub fn evaluate(spec: &FilterSpec, record: &Record) -> bool {
    let value = record.field(&spec.column);
    match &spec.operator {
        FilterOperator::Date(op) => evaluate_date(*op, value, &spec.value),
        FilterOperator::Generic(op) => evaluate_generic(*op, value, &spec.value),
        FilterOperator::UnknownDate(name) => {
            if spec.value.is_empty() {
                return true;
            }
            warn!(operator = %name, column = %spec.column, "Unknown date operator, predicate fails");
            false
        }
        FilterOperator::Unknown(name) => {
            debug!(operator = %name, column = %spec.column, "Unknown operator, predicate passes");
            true
        }
    }
}

/// Date predicates. An empty operand passes; an unparseable field value,
/// a malformed operand or a malformed `start|end` pair fails.
pub fn evaluate_date(op: DateOperator, value: Option<&FieldValue>, operand: &str) -> bool {
    if operand.is_empty() {
        return true;
    }

    let Some(field_date) = normalize_date(value.unwrap_or(&FieldValue::Null)).date() else {
        return false;
    };

    match op {
        DateOperator::Before => compare_single(operand, |d| field_date < d),
        DateOperator::After => compare_single(operand, |d| field_date > d),
        DateOperator::On => compare_single(operand, |d| field_date == d),
        DateOperator::Between => {
            let bounds: Vec<&str> = operand.split('|').collect();
            let [start, end] = bounds.as_slice() else {
                warn!(operand = %operand, "date_between expects 'start|end'");
                return false;
            };
            match (parse_iso_operand(start), parse_iso_operand(end)) {
                (Some(start), Some(end)) => start <= field_date && field_date <= end,
                _ => {
                    warn!(operand = %operand, "Invalid date_between bounds");
                    false
                }
            }
        }
    }
}

fn compare_single(operand: &str, cmp: impl Fn(NaiveDate) -> bool) -> bool {
    match parse_iso_operand(operand) {
        Some(d) => cmp(d),
        None => {
            warn!(operand = %operand, "Invalid date operand, expected YYYY-MM-DD");
            false
        }
    }
}

/// Generic predicates: emptiness, case-insensitive text comparison and
/// best-effort numeric comparison.
pub fn evaluate_generic(op: GenericOperator, value: Option<&FieldValue>, operand: &str) -> bool {
    let field_text = || value.map(FieldValue::to_text).unwrap_or_default().to_lowercase();
    let operand_text = operand.to_lowercase();

    match op {
        GenericOperator::Empty => value.is_none_or(FieldValue::is_blank),
        GenericOperator::NotEmpty => !value.is_none_or(FieldValue::is_blank),
        _ if operand.is_empty() => true,
        GenericOperator::Equals => field_text() == operand_text,
        GenericOperator::NotEquals => field_text() != operand_text,
        GenericOperator::Contains => field_text().contains(&operand_text),
        GenericOperator::NotContains => !field_text().contains(&operand_text),
        GenericOperator::StartsWith => field_text().starts_with(&operand_text),
        GenericOperator::EndsWith => field_text().ends_with(&operand_text),
        GenericOperator::GreaterThan => coerce_number(value) > number_or_default(operand),
        GenericOperator::LessThan => coerce_number(value) < number_or_default(operand),
        GenericOperator::GreaterEqual => coerce_number(value) >= number_or_default(operand),
        GenericOperator::LessEqual => coerce_number(value) <= number_or_default(operand),
    }
}

/// Read a field as a number. Absent, null and non-numeric values become
/// [`NUMERIC_DEFAULT`]; booleans count as 1 and 0.
pub fn coerce_number(value: Option<&FieldValue>) -> f64 {
    match value {
        None | Some(FieldValue::Null) => NUMERIC_DEFAULT,
        Some(FieldValue::Integer(n)) => *n as f64,
        Some(FieldValue::Float(x)) if x.is_finite() => *x,
        Some(FieldValue::Bool(b)) => f64::from(u8::from(*b)),
        Some(FieldValue::Text(s)) => number_or_default(s),
        Some(other) => {
            debug!(value = %other, "Value is not numeric, using default");
            NUMERIC_DEFAULT
        }
    }
}

/// Parse text as a finite number, or [`NUMERIC_DEFAULT`].
pub fn number_or_default(text: &str) -> f64 {
    match text.trim().parse::<f64>() {
        Ok(x) if x.is_finite() => x,
        _ => {
            if !text.trim().is_empty() {
                debug!(value = %text, "Text is not numeric, using default");
            }
            NUMERIC_DEFAULT
        }
    }
}
