//! Configuration types.
//!
//! Three sources, all resolved before any record is read:
//! - the run configuration file (JSON): identifiers, templates, filters
//! - run-time toggles from the environment (dry-run, force, ...)
//! - API secrets and endpoints from the environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ConfigError;
use crate::filter::{FilterLogic, FilterOperator, FilterSpec};

/// Default location of the run configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/public-config.json";

/// Default directory for the run artifact and the log file.
pub const DEFAULT_RESULTS_DIR: &str = "logs";

/// Timeout applied to every external call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_GRIST_URL: &str = "https://grist.numerique.gouv.fr/api";
pub const DEFAULT_DS_URL: &str = "https://www.demarches-simplifiees.fr/api/v2/graphql";

// ── Record field names ──────────────────────────────────────────────

/// Names of the fields the engine reads to gate records and writes back
/// after each dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusFields {
    /// External case identifier; records without it are never dispatched.
    pub key: String,
    /// Delivery status (`success` / `failure`).
    pub status: String,
    /// Timestamp of the last attempt.
    pub date: String,
    /// Last error text, empty on success.
    pub error: String,
}

impl Default for StatusFields {
    fn default() -> Self {
        Self {
            key: "dossier_id".to_string(),
            status: "sync_mail".to_string(),
            date: "sync_date".to_string(),
            error: "sync_error".to_string(),
        }
    }
}

// ── Run configuration file ──────────────────────────────────────────

/// Run configuration, loaded from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    /// Procedure (démarche) the cases belong to.
    #[serde(default, alias = "demarche_number", deserialize_with = "string_or_number")]
    pub procedure_number: String,
    /// Subject template, `{field}` placeholders.
    #[serde(default)]
    pub message_subject: String,
    /// Body template, `{field}` placeholders.
    #[serde(default)]
    pub message_body: String,
    /// Instructor the messages are sent as.
    #[serde(default, alias = "instructeur_id", deserialize_with = "string_or_number")]
    pub instructor_id: String,
    #[serde(default)]
    pub grist_doc_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub grist_table: String,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub filter_logic: FilterLogic,
    #[serde(default)]
    pub fields: StatusFields,
    /// Fields rendered verbatim in templates, never date-formatted.
    #[serde(default)]
    pub raw_fields: Vec<String>,
}

impl RunConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::ParseError {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        config.warn_unknown_operators();
        Ok(config)
    }

    /// Check that every required key is present and non-blank.
    /// Reports all missing keys at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("procedure_number", &self.procedure_number),
            ("message_subject", &self.message_subject),
            ("message_body", &self.message_body),
            ("instructor_id", &self.instructor_id),
            ("grist_doc_id", &self.grist_doc_id),
            ("grist_table", &self.grist_table),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired { keys: missing });
        }

        if let Some(position) = self.filters.iter().position(|f| f.column.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: format!("filters[{position}].column"),
                message: "column name is empty".to_string(),
            });
        }

        let fields = &self.fields;
        if [&fields.key, &fields.status, &fields.date, &fields.error]
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                key: "fields".to_string(),
                message: "field names must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Unknown operators silently pass or fail every record. Surface them loudly.
    fn warn_unknown_operators(&self) {
        for spec in &self.filters {
            match &spec.operator {
                FilterOperator::UnknownDate(_) => warn!(
                    column = %spec.column,
                    operator = %spec.operator,
                    "Unknown date operator: this filter matches no record"
                ),
                FilterOperator::Unknown(_) => warn!(
                    column = %spec.column,
                    operator = %spec.operator,
                    "Unknown filter operator: this filter matches every record"
                ),
                FilterOperator::Date(_) | FilterOperator::Generic(_) => {}
            }
        }
    }
}

/// Accept a string, a number or null where an identifier is expected.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or a number, got {other}"
        ))),
    }
}

// ── Run-time toggles ────────────────────────────────────────────────

/// Booleans and paths supplied by the environment at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunToggles {
    /// Render and evaluate everything, send nothing, write nothing back.
    pub dry_run: bool,
    /// Re-send to records that already hold the success marker.
    pub force_send: bool,
    /// Exit non-zero when any record failed.
    pub fail_on_error: bool,
    /// Where the run artifact and log file go.
    pub results_dir: PathBuf,
}

impl Default for RunToggles {
    fn default() -> Self {
        Self {
            dry_run: false,
            force_send: false,
            fail_on_error: false,
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
        }
    }
}

impl RunToggles {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build toggles from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).is_some_and(|v| parse_flag(&v));
        Self {
            dry_run: flag("DRY_RUN"),
            force_send: flag("FORCE_SEND"),
            fail_on_error: flag("FAIL_ON_ERROR"),
            results_dir: lookup("RESULTS_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR)),
        }
    }
}

/// `true`, `1` and `yes` (any case) are true; everything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// Path of the run configuration file (`NOTIFIER_CONFIG`).
pub fn config_path_from_env() -> PathBuf {
    std::env::var("NOTIFIER_CONFIG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ── API secrets and endpoints ───────────────────────────────────────

/// Credentials and endpoints for the two external APIs.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub grist_url: String,
    pub grist_token: SecretString,
    pub ds_url: String,
    pub ds_token: SecretString,
    pub timeout: Duration,
}

impl ApiSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Both tokens are required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };
        let ds_token = required("DS_API_TOKEN")?;
        let grist_token = required("GRIST_API_TOKEN")?;

        Ok(Self {
            grist_url: lookup("GRIST_API_URL").unwrap_or_else(|| DEFAULT_GRIST_URL.to_string()),
            grist_token: SecretString::from(grist_token),
            ds_url: lookup("DS_API_URL").unwrap_or_else(|| DEFAULT_DS_URL.to_string()),
            ds_token: SecretString::from(ds_token),
            timeout: HTTP_TIMEOUT,
        })
    }
}
