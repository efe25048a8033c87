//! Per-record dispatch outcome and its write-back form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::StatusFields;

/// Error text stored on a record is capped at this many characters.
pub const MAX_ERROR_CHARS: usize = 500;

/// Delivery status of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failure")]
    Failure,
    /// Dry run: rendered but not sent.
    #[serde(rename = "success-dry")]
    SuccessDry,
}

impl OutcomeStatus {
    /// Value stored in the status field. `success` is the marker the
    /// selector uses to skip records on later runs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::SuccessDry => "success-dry",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::SuccessDry)
    }
}

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub status: OutcomeStatus,
    pub timestamp: DateTime<Utc>,
    /// Error text, at most [`MAX_ERROR_CHARS`] characters.
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn success() -> Self {
        Self {
            status: OutcomeStatus::Success,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn dry_run() -> Self {
        Self {
            status: OutcomeStatus::SuccessDry,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            timestamp: Utc::now(),
            error: Some(truncate_error(message)),
        }
    }

    /// Fields written back onto the record: status, timestamp and error
    /// text (empty on success).
    pub fn write_back_fields(&self, fields: &StatusFields) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(fields.status.clone(), json!(self.status.as_str()));
        map.insert(
            fields.date.clone(),
            json!(self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        map.insert(
            fields.error.clone(),
            json!(self.error.as_deref().unwrap_or_default()),
        );
        map
    }
}

/// Cap error text at [`MAX_ERROR_CHARS`] characters (not bytes).
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_CHARS) {
        Some((cut, _)) => message[..cut].to_string(),
        None => message.to_string(),
    }
}
