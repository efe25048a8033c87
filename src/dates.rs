//! Date normalizer: turns heterogeneous cell values into calendar dates.
//!
//! Resolution order:
//! 1. Values that already carry calendar-date semantics
//! 2. Unix timestamps (numbers or all-digit text), seconds or milliseconds
//! 3. A fixed list of textual formats, first match wins
//! 4. An embedded `YYYY-MM-DD` anywhere in the text
//!
//! Nothing here returns an error: a value that resolves to no date is
//! reported as [`ParsedDate::Unparseable`].

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::{debug, warn};

use crate::record::FieldValue;

/// Timestamps whose magnitude is strictly above this are milliseconds.
pub const MILLIS_THRESHOLD: f64 = 1e10;

/// Canonical operand format for date filters.
pub const ISO_DATE: &str = "%Y-%m-%d";

/// Textual formats tried in order. The flag marks formats carrying a time.
const TEXT_FORMATS: &[(&str, bool)] = &[
    ("%Y-%m-%d", false),
    ("%Y-%m-%d %H:%M:%S", true),
    ("%Y-%m-%dT%H:%M:%S", true),
    ("%Y-%m-%dT%H:%M:%SZ", true),
    ("%d/%m/%Y", false),
    ("%d/%m/%Y %H:%M:%S", true),
    ("%d-%m-%Y", false),
    ("%d-%m-%Y %H:%M:%S", true),
];

static EMBEDDED_ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());

/// How a cell value presents a point in time.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput<'a> {
    /// Already a calendar date (or a date-time, reduced to its date).
    Native(NaiveDate),
    /// A number, read as a Unix timestamp.
    Timestamp(f64),
    /// Text made only of ASCII digits, read as a Unix timestamp.
    NumericText(&'a str),
    /// Any other non-blank text.
    Text(&'a str),
    /// Null or blank text.
    Empty,
    /// Booleans, numeric zero, lists and other values with no date reading.
    Unknown,
}

impl<'a> DateInput<'a> {
    pub fn classify(value: &'a FieldValue) -> Self {
        match value {
            FieldValue::Null => Self::Empty,
            FieldValue::Date(d) => Self::Native(*d),
            FieldValue::DateTime(dt) => Self::Native(dt.date_naive()),
            // A zero count is a count, not the epoch.
            FieldValue::Integer(0) => Self::Unknown,
            FieldValue::Float(x) if *x == 0.0 => Self::Unknown,
            FieldValue::Integer(n) => Self::Timestamp(*n as f64),
            FieldValue::Float(x) => Self::Timestamp(*x),
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Self::Empty
                } else if trimmed.bytes().all(|b| b.is_ascii_digit()) {
                    Self::NumericText(trimmed)
                } else {
                    Self::Text(trimmed)
                }
            }
            FieldValue::Bool(_) | FieldValue::Other(_) => Self::Unknown,
        }
    }
}

/// Result of normalizing a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDate {
    Date(NaiveDate),
    /// Nothing to parse (null or blank).
    Absent,
    /// A value was present but no reading produced a date. Carries the raw text.
    Unparseable(String),
}

impl ParsedDate {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Absent | Self::Unparseable(_) => None,
        }
    }
}

/// Normalize a value to a calendar date, warning when it cannot be read.
pub fn normalize_date(value: &FieldValue) -> ParsedDate {
    let parsed = parse_date(value);
    if let ParsedDate::Unparseable(raw) = &parsed {
        warn!(value = %raw, "Cannot parse date");
    }
    parsed
}

/// Normalize without logging. Used where most values are expected not
/// to be dates (template rendering, date detection).
pub fn parse_date(value: &FieldValue) -> ParsedDate {
    match DateInput::classify(value) {
        DateInput::Empty => ParsedDate::Absent,
        DateInput::Native(d) => ParsedDate::Date(d),
        DateInput::Timestamp(ts) => match date_from_timestamp(ts) {
            Some(d) => ParsedDate::Date(d),
            None => parse_text(&value.to_text()),
        },
        DateInput::NumericText(digits) => {
            match digits.parse::<i64>().ok().and_then(|n| date_from_timestamp(n as f64)) {
                Some(d) => ParsedDate::Date(d),
                None => parse_text(digits),
            }
        }
        DateInput::Text(text) => parse_text(text),
        DateInput::Unknown => ParsedDate::Unparseable(value.to_text()),
    }
}

/// Convert a Unix timestamp (seconds, or milliseconds above the threshold)
/// to its UTC calendar date. Non-finite or out-of-range values yield `None`.
pub fn date_from_timestamp(ts: f64) -> Option<NaiveDate> {
    if !ts.is_finite() {
        return None;
    }
    let secs = if ts.abs() > MILLIS_THRESHOLD {
        ts / 1000.0
    } else {
        ts
    };
    DateTime::from_timestamp(secs.floor() as i64, 0).map(|dt| dt.date_naive())
}

fn parse_text(text: &str) -> ParsedDate {
    let text = text.trim();
    for (format, has_time) in TEXT_FORMATS {
        let parsed = if *has_time {
            NaiveDateTime::parse_from_str(text, format)
                .ok()
                .map(|dt| dt.date())
        } else {
            NaiveDate::parse_from_str(text, format).ok()
        };
        if let Some(d) = parsed {
            return ParsedDate::Date(d);
        }
    }

    if let Some(d) = EMBEDDED_ISO
        .find(text)
        .and_then(|found| NaiveDate::parse_from_str(found.as_str(), ISO_DATE).ok())
    {
        return ParsedDate::Date(d);
    }

    ParsedDate::Unparseable(text.to_string())
}

/// Parse a filter operand in strict `YYYY-MM-DD` form.
pub fn parse_iso_operand(operand: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(operand.trim(), ISO_DATE).ok()
}

/// Render a value for message text: dates as `DD/MM/YYYY`, everything
/// else as its plain text. Null and empty text render as empty text.
pub fn format_date_french(value: &FieldValue) -> String {
    match parse_date(value) {
        ParsedDate::Date(d) => return d.format("%d/%m/%Y").to_string(),
        ParsedDate::Absent => return String::new(),
        ParsedDate::Unparseable(_) => {}
    }

    if let FieldValue::Text(s) = value {
        let iso_prefix = s
            .get(..10)
            .filter(|_| s.contains('-'))
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, ISO_DATE).ok());
        if let Some(d) = iso_prefix {
            return d.format("%d/%m/%Y").to_string();
        }
    }

    debug!(value = %value, "Value is not a date, rendering as text");
    value.to_text()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse(value: impl Into<FieldValue>) -> Option<NaiveDate> {
        parse_date(&value.into()).date()
    }

    #[test]
    fn textual_formats_round_trip() {
        let dates = [
            ymd(2023, 12, 25),
            ymd(2024, 2, 29),
            ymd(1999, 1, 1),
            ymd(2000, 10, 5),
            ymd(2031, 7, 31),
        ];
        for d in dates {
            for (format, has_time) in TEXT_FORMATS {
                let text = if *has_time {
                    d.and_hms_opt(14, 30, 0).unwrap().format(format).to_string()
                } else {
                    d.format(format).to_string()
                };
                assert_eq!(parse(text.as_str()), Some(d), "format {format}: {text}");
            }
        }
    }

    #[test]
    fn native_dates_pass_through() {
        assert_eq!(parse(ymd(2023, 12, 25)), Some(ymd(2023, 12, 25)));
        let dt = DateTime::from_timestamp(1703514600, 0).unwrap();
        assert_eq!(
            parse_date(&FieldValue::DateTime(dt)).date(),
            Some(ymd(2023, 12, 25))
        );
    }

    #[test]
    fn timestamp_in_seconds() {
        assert_eq!(parse(1703462400_i64), Some(ymd(2023, 12, 25)));
        assert_eq!(parse(1703462400.0_f64), Some(ymd(2023, 12, 25)));
    }

    #[test]
    fn timestamp_in_milliseconds() {
        assert_eq!(parse(1703462400000_i64), Some(ymd(2023, 12, 25)));
        assert_eq!(parse(1703462400123.0_f64), Some(ymd(2023, 12, 25)));
    }

    #[test]
    fn threshold_is_seconds_at_exactly_1e10() {
        // 1e10 seconds after the epoch is 2286-11-20.
        assert_eq!(parse(10_000_000_000_i64), Some(ymd(2286, 11, 20)));
        // One more and it is read as milliseconds: 10_000_000.001 s.
        assert_eq!(parse(10_000_000_001_i64), Some(ymd(1970, 4, 26)));
    }

    #[test]
    fn digit_strings_are_timestamps() {
        assert_eq!(parse("1703462400"), Some(ymd(2023, 12, 25)));
        assert_eq!(parse(" 1703462400000 "), Some(ymd(2023, 12, 25)));
    }

    #[test]
    fn non_finite_numbers_are_unparseable() {
        assert!(matches!(
            parse_date(&FieldValue::Float(f64::INFINITY)),
            ParsedDate::Unparseable(_)
        ));
        assert!(matches!(
            parse_date(&FieldValue::Float(f64::NAN)),
            ParsedDate::Unparseable(_)
        ));
    }

    #[test]
    fn numeric_zero_is_not_a_date() {
        assert_eq!(DateInput::classify(&FieldValue::Integer(0)), DateInput::Unknown);
        assert_eq!(DateInput::classify(&FieldValue::Float(0.0)), DateInput::Unknown);
        assert_eq!(
            parse_date(&FieldValue::Integer(0)),
            ParsedDate::Unparseable("0".into())
        );
        assert_eq!(format_date_french(&FieldValue::Integer(0)), "0");
        assert_eq!(format_date_french(&FieldValue::Float(0.0)), "0");
        // Digit text is still a timestamp, zero included.
        assert_eq!(parse("0"), Some(ymd(1970, 1, 1)));
        assert_eq!(parse(1_i64), Some(ymd(1970, 1, 1)));
    }

    #[test]
    fn embedded_iso_date_is_found() {
        assert_eq!(parse("2023-12-25T14:30:00.123Z"), Some(ymd(2023, 12, 25)));
        assert_eq!(parse("2023-12-25T14:30:00+01:00"), Some(ymd(2023, 12, 25)));
        assert_eq!(parse("échéance: 2023-12-25 (ferme)"), Some(ymd(2023, 12, 25)));
    }

    #[test]
    fn invalid_embedded_date_is_unparseable() {
        assert_eq!(
            parse_date(&"2023-13-45".into()),
            ParsedDate::Unparseable("2023-13-45".into())
        );
    }

    #[test]
    fn unparseable_and_absent() {
        assert_eq!(
            normalize_date(&"bonjour".into()),
            ParsedDate::Unparseable("bonjour".into())
        );
        assert!(matches!(
            normalize_date(&FieldValue::Bool(true)),
            ParsedDate::Unparseable(_)
        ));
        assert_eq!(normalize_date(&FieldValue::Null), ParsedDate::Absent);
        assert_eq!(normalize_date(&"   ".into()), ParsedDate::Absent);
    }

    #[test]
    fn classify_covers_representations() {
        assert_eq!(
            DateInput::classify(&"123".into()),
            DateInput::NumericText("123")
        );
        assert_eq!(DateInput::classify(&"12a".into()), DateInput::Text("12a"));
        assert_eq!(DateInput::classify(&FieldValue::Integer(5)), DateInput::Timestamp(5.0));
        assert_eq!(DateInput::classify(&FieldValue::Null), DateInput::Empty);
        assert_eq!(DateInput::classify(&FieldValue::Bool(false)), DateInput::Unknown);
    }

    #[test]
    fn iso_operand_is_strict() {
        assert_eq!(parse_iso_operand("2023-01-01"), Some(ymd(2023, 1, 1)));
        assert_eq!(parse_iso_operand(" 2023-01-01 "), Some(ymd(2023, 1, 1)));
        assert_eq!(parse_iso_operand("01/01/2023"), None);
        assert_eq!(parse_iso_operand(""), None);
    }

    #[test]
    fn french_formatting() {
        assert_eq!(format_date_french(&"2023-12-25".into()), "25/12/2023");
        assert_eq!(format_date_french(&"25-12-2023 08:00:00".into()), "25/12/2023");
        assert_eq!(format_date_french(&FieldValue::Integer(1703462400)), "25/12/2023");
        assert_eq!(format_date_french(&ymd(2024, 2, 29).into()), "29/02/2024");
    }

    #[test]
    fn french_formatting_falls_back_to_text() {
        assert_eq!(format_date_french(&"Madame Durand".into()), "Madame Durand");
        assert_eq!(format_date_french(&FieldValue::Bool(true)), "true");
        assert_eq!(format_date_french(&FieldValue::Null), "");
        assert_eq!(format_date_french(&"".into()), "");
    }
}
