//! Message templates with `{field_name}` placeholders.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::dates::format_date_french;
use crate::record::Record;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").unwrap());

/// Renders subject and body templates against a record.
///
/// Every non-null field is substituted; date-like values are shown as
/// `DD/MM/YYYY`. Placeholders naming a missing or null field stay in the
/// output literally.
///
/// Raw fields skip the date formatter and render as plain text. The
/// dispatch controller always registers the record key as raw: case
/// numbers are digit strings and would otherwise read as timestamps
/// (`"42"` would render as `01/01/1970`).
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    raw_fields: HashSet<String>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields that are always rendered verbatim, never date-formatted.
    pub fn with_raw_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Substitute placeholders in a single pass over the template, so
    /// substituted text is never itself re-expanded.
    pub fn render(&self, template: &str, record: &Record) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                let name = &caps[1];
                match record.field(name) {
                    Some(value) if !value.is_null() => {
                        if self.raw_fields.contains(name) {
                            value.to_text()
                        } else {
                            format_date_french(value)
                        }
                    }
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}
