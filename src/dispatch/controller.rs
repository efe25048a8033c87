//! Dispatch controller: the only component that talks to collaborators.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clients::{MessageSender, RecordStore, TableRef};
use crate::config::{RunConfig, RunToggles, StatusFields};
use crate::dates::{format_date_french, parse_date};
use crate::dispatch::outcome::DispatchOutcome;
use crate::dispatch::report::{BatchResult, ResultAggregator, RunReport};
use crate::error::DispatchError;
use crate::filter::{RecordSelector, Selection};
use crate::record::Record;
use crate::template::TemplateRenderer;

/// How many detected date fields are logged per record.
const LOGGED_DATE_FIELDS: usize = 3;

/// Everything the controller needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub table: TableRef,
    /// Sender identity on the case-management side.
    pub recipient_id: String,
    pub subject_template: String,
    pub body_template: String,
    pub fields: StatusFields,
    pub dry_run: bool,
}

impl DispatchSettings {
    pub fn from_config(config: &RunConfig, toggles: &RunToggles) -> Self {
        Self {
            table: TableRef::new(&config.grist_doc_id, &config.grist_table),
            recipient_id: config.instructor_id.clone(),
            subject_template: config.message_subject.clone(),
            body_template: config.message_body.clone(),
            fields: config.fields.clone(),
            dry_run: toggles.dry_run,
        }
    }
}

/// Drives a run: fetch, select, then render/send/write back record by record.
pub struct DispatchController {
    store: Arc<dyn RecordStore>,
    sender: Arc<dyn MessageSender>,
    renderer: TemplateRenderer,
    settings: DispatchSettings,
}

impl DispatchController {
    /// The key field is always rendered verbatim: case numbers are digits
    /// and would otherwise read as timestamps.
    pub fn new(
        store: Arc<dyn RecordStore>,
        sender: Arc<dyn MessageSender>,
        settings: DispatchSettings,
    ) -> Self {
        let renderer = TemplateRenderer::new().with_raw_fields([settings.fields.key.clone()]);
        Self {
            store,
            sender,
            renderer,
            settings,
        }
    }

    /// Additional fields rendered verbatim.
    pub fn with_raw_fields(mut self, fields: &[String]) -> Self {
        self.renderer = self.renderer.with_raw_fields(fields.iter().cloned());
        self
    }

    /// Run one batch end to end. Never fails: a fetch error yields an
    /// empty run whose report carries the error.
    pub async fn run(&self, selector: &RecordSelector) -> RunReport {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            table = %self.settings.table.table,
            dry_run = self.settings.dry_run,
            force = selector.force(),
            "Starting batch"
        );

        let (selection, fetch_error) = match self.store.get_records(&self.settings.table).await {
            Ok(records) => {
                info!(count = records.len(), "Records fetched");
                (selector.select(records), None)
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch records");
                (Selection::default(), Some(e.to_string()))
            }
        };

        let result = if selection.records.is_empty() {
            info!("No records to process");
            BatchResult::default()
        } else {
            self.dispatch_all(&selection.records).await
        };

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.settings.dry_run,
            force_send: selector.force(),
            selection: selection.stats,
            fetch_error,
            result,
        }
    }

    /// Process records one at a time, in order, isolating failures.
    pub async fn dispatch_all(&self, records: &[Record]) -> BatchResult {
        let mut aggregator = ResultAggregator::new();
        let count = records.len();

        for (i, record) in records.iter().enumerate() {
            let case_id = record.text(&self.settings.fields.key);
            info!(
                record_id = record.id,
                case_id = %case_id,
                "Processing {}/{}",
                i + 1,
                count
            );

            let result = self.process_record(record).await;
            if let Err(e) = &result {
                error!(record_id = record.id, error = %e, "Record skipped");
            }
            aggregator.record(record.id, &case_id, &result);
        }

        aggregator.finish()
    }

    /// Render, send and write back a single record.
    ///
    /// Delivery errors become a `failure` outcome, not an `Err`; `Err` is
    /// reserved for records that cannot be dispatched at all.
    pub async fn process_record(&self, record: &Record) -> Result<DispatchOutcome, DispatchError> {
        let case_id = record
            .field(&self.settings.fields.key)
            .map(|v| v.to_text().trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DispatchError::MissingKey {
                record_id: record.id,
                field: self.settings.fields.key.clone(),
            })?;

        log_detected_dates(record);

        let subject = self.renderer.render(&self.settings.subject_template, record);
        let body = self.renderer.render(&self.settings.body_template, record);
        debug!(case_id = %case_id, subject = %subject, "Rendered message");

        if self.settings.dry_run {
            info!(case_id = %case_id, "[dry run] Message would be sent");
            return Ok(DispatchOutcome::dry_run());
        }

        let outcome = match self
            .sender
            .send_message(&case_id, &self.settings.recipient_id, &subject, &body)
            .await
        {
            Ok(sent) => {
                info!(case_id = %case_id, message_id = ?sent.id, "Message sent");
                DispatchOutcome::success()
            }
            Err(e) => {
                error!(case_id = %case_id, error = %e, "Message send failed");
                DispatchOutcome::failure(&e.to_string())
            }
        };

        self.write_back(record.id, &case_id, &outcome).await;
        Ok(outcome)
    }

    /// Store the outcome on the record. Failures here are bookkeeping
    /// problems: logged, never folded into the delivery outcome.
    async fn write_back(&self, record_id: i64, case_id: &str, outcome: &DispatchOutcome) {
        let fields = outcome.write_back_fields(&self.settings.fields);
        match self
            .store
            .update_record(&self.settings.table, record_id, fields)
            .await
        {
            Ok(()) => debug!(record_id, case_id = %case_id, "Status written back"),
            Err(e) => warn!(
                record_id,
                case_id = %case_id,
                error = %e,
                "Failed to write status back"
            ),
        }
    }
}

fn log_detected_dates(record: &Record) {
    let detected: Vec<String> = record
        .fields
        .iter()
        .filter(|(_, value)| parse_date(value).date().is_some())
        .take(LOGGED_DATE_FIELDS)
        .map(|(name, value)| format!("{name}: {value} → {}", format_date_french(value)))
        .collect();
    if !detected.is_empty() {
        debug!(record_id = record.id, dates = %detected.join(", "), "Dates detected");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use super::*;
    use crate::clients::SentMessage;
    use crate::dispatch::outcome::OutcomeStatus;
    use crate::error::{MessagingError, StoreError};
    use crate::filter::{FilterLogic, FilterOperator, FilterSpec};
    use crate::record::FieldValue;

    // ── Fakes ───────────────────────────────────────────────────────

    /// In-memory store that applies updates to its own records.
    #[derive(Default)]
    struct FakeStore {
        records: Mutex<Vec<Record>>,
        updates: Mutex<Vec<(i64, Map<String, Value>)>>,
        fail_fetch: bool,
        fail_updates: bool,
    }

    impl FakeStore {
        fn with_records(records: Vec<Record>) -> Self {
            Self {
                records: Mutex::new(records),
                ..Default::default()
            }
        }

        fn updates(&self) -> Vec<(i64, Map<String, Value>)> {
            self.updates.lock().unwrap().clone()
        }

        fn record(&self, id: i64) -> Record {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn get_records(&self, _table: &TableRef) -> Result<Vec<Record>, StoreError> {
            if self.fail_fetch {
                return Err(StoreError::Http {
                    status: 401,
                    body: "unauthorized".into(),
                });
            }
            Ok(self.records.lock().unwrap().clone())
        }

        async fn update_record(
            &self,
            _table: &TableRef,
            record_id: i64,
            fields: Map<String, Value>,
        ) -> Result<(), StoreError> {
            if self.fail_updates {
                return Err(StoreError::Request("connection reset".into()));
            }
            self.updates.lock().unwrap().push((record_id, fields.clone()));
            let mut records = self.records.lock().unwrap();
            if let Some(record) = records.iter_mut().find(|r| r.id == record_id) {
                for (name, value) in fields {
                    record.fields.insert(name, FieldValue::from(value));
                }
            }
            Ok(())
        }
    }

    /// Sender that records calls and fails for selected case ids.
    #[derive(Default)]
    struct FakeSender {
        sent: Mutex<Vec<(String, String, String, String)>>,
        failing_cases: HashSet<String>,
        error_text: String,
    }

    impl FakeSender {
        fn failing(cases: &[&str], error_text: &str) -> Self {
            Self {
                failing_cases: cases.iter().map(|c| c.to_string()).collect(),
                error_text: error_text.to_string(),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(String, String, String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSender for FakeSender {
        async fn send_message(
            &self,
            case_id: &str,
            recipient_id: &str,
            subject: &str,
            body: &str,
        ) -> Result<SentMessage, MessagingError> {
            if self.failing_cases.contains(case_id) {
                return Err(MessagingError::Remote(vec![self.error_text.clone()]));
            }
            self.sent.lock().unwrap().push((
                case_id.into(),
                recipient_id.into(),
                subject.into(),
                body.into(),
            ));
            Ok(SentMessage {
                id: Some(format!("msg-{case_id}")),
            })
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn settings(dry_run: bool) -> DispatchSettings {
        DispatchSettings {
            table: TableRef::new("doc", "Dossiers"),
            recipient_id: "instructeur-1".into(),
            subject_template: "Dossier {dossier_id}".into(),
            body_template: "Bonjour, échéance le {due}".into(),
            fields: StatusFields::default(),
            dry_run,
        }
    }

    fn record(id: i64, case_id: &str) -> Record {
        Record::new(id)
            .with_field("dossier_id", case_id)
            .with_field("amount", 120_i64)
            .with_field("due", "2023-12-25")
    }

    fn controller(
        store: &Arc<FakeStore>,
        sender: &Arc<FakeSender>,
        dry_run: bool,
    ) -> DispatchController {
        DispatchController::new(store.clone(), sender.clone(), settings(dry_run))
    }

    fn selector() -> RecordSelector {
        RecordSelector::new(vec![], FilterLogic::And, StatusFields::default())
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn sends_rendered_message_and_writes_success() {
        let store = Arc::new(FakeStore::with_records(vec![record(1, "42")]));
        let sender = Arc::new(FakeSender::default());
        let ctl = controller(&store, &sender, false);

        let outcome = ctl.process_record(&record(1, "42")).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Success);

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "42");
        assert_eq!(sent[0].1, "instructeur-1");
        assert_eq!(sent[0].2, "Dossier 42");
        assert_eq!(sent[0].3, "Bonjour, échéance le 25/12/2023");

        let updates = store.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, 1);
        assert_eq!(updates[0].1["sync_mail"], "success");
        assert_eq!(updates[0].1["sync_error"], "");
    }

    #[tokio::test]
    async fn dry_run_sends_nothing_and_writes_nothing() {
        let store = Arc::new(FakeStore::with_records(vec![record(1, "42")]));
        let sender = Arc::new(FakeSender::default());
        let ctl = controller(&store, &sender, true);

        let outcome = ctl.process_record(&record(1, "42")).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::SuccessDry);
        assert!(sender.sent().is_empty());
        assert!(store.updates().is_empty());
        assert!(store.record(1).field("sync_mail").is_none());

        let report = ctl.run(&selector()).await;
        assert!(report.dry_run);
        assert_eq!(report.result.success_count, 1);
        assert!(store.updates().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_recorded_and_truncated() {
        let long_error = "e".repeat(800);
        let store = Arc::new(FakeStore::with_records(vec![record(1, "42")]));
        let sender = Arc::new(FakeSender::failing(&["42"], &long_error));
        let ctl = controller(&store, &sender, false);

        let outcome = ctl.process_record(&record(1, "42")).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Failure);
        let stored_error = outcome.error.unwrap();
        assert_eq!(stored_error.chars().count(), 500);
        assert!(stored_error.starts_with("Remote errors: eee"));

        let updates = store.updates();
        assert_eq!(updates[0].1["sync_mail"], "failure");
        assert_eq!(updates[0].1["sync_error"].as_str().unwrap().chars().count(), 500);
    }

    #[tokio::test]
    async fn write_back_failure_keeps_delivery_outcome() {
        let store = Arc::new(FakeStore {
            fail_updates: true,
            ..FakeStore::with_records(vec![record(1, "42")])
        });
        let sender = Arc::new(FakeSender::default());
        let ctl = controller(&store, &sender, false);

        let outcome = ctl.process_record(&record(1, "42")).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Success);

        let report = ctl.run(&selector()).await;
        assert_eq!(report.result.success_count, 1);
        assert_eq!(report.result.error_count, 0);
    }

    #[tokio::test]
    async fn record_without_key_is_isolated() {
        let store = Arc::new(FakeStore::default());
        let sender = Arc::new(FakeSender::default());
        let ctl = controller(&store, &sender, false);

        let records = vec![
            record(1, "42"),
            Record::new(2).with_field("dossier_id", "  "),
            record(3, "44"),
        ];
        let result = ctl.dispatch_all(&records).await;
        assert_eq!(result.total, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.details[0].record_id, 2);
        assert_eq!(sender.sent().len(), 2);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let records = vec![record(1, "41"), record(2, "42"), record(3, "43")];
        let store = Arc::new(FakeStore::with_records(records));
        let sender = Arc::new(FakeSender::failing(&["42"], "Dossier introuvable"));
        let ctl = controller(&store, &sender, false);

        let report = ctl.run(&selector()).await;
        assert_eq!(report.result.total, 3);
        assert_eq!(report.result.success_count, 2);
        assert_eq!(report.result.error_count, 1);
        assert_eq!(report.result.details[0].case_id, "42");
        assert_eq!(
            report.result.details[0].error,
            "Remote errors: Dossier introuvable"
        );

        let order: Vec<String> = sender.sent().into_iter().map(|s| s.0).collect();
        assert_eq!(order, vec!["41", "43"]);
    }

    #[tokio::test]
    async fn rerun_skips_records_already_sent() {
        let records = vec![record(1, "41"), record(2, "42")];
        let store = Arc::new(FakeStore::with_records(records));
        let sender = Arc::new(FakeSender::failing(&["42"], "Timeout"));
        let ctl = controller(&store, &sender, false);

        let first = ctl.run(&selector()).await;
        assert_eq!(first.selection.selected, 2);

        let second = ctl.run(&selector()).await;
        assert_eq!(second.selection.already_sent, 1);
        assert_eq!(second.selection.selected, 1);
        assert_eq!(second.result.total, 1);
        assert_eq!(sender.sent().len(), 1);

        let forced = ctl.run(&selector().with_force(true)).await;
        assert!(forced.force_send);
        assert_eq!(forced.selection.selected, 2);
        assert_eq!(sender.sent().len(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_yields_empty_report() {
        let store = Arc::new(FakeStore {
            fail_fetch: true,
            ..Default::default()
        });
        let sender = Arc::new(FakeSender::default());
        let ctl = controller(&store, &sender, false);

        let report = ctl.run(&selector()).await;
        assert_eq!(report.result, BatchResult::default());
        assert_eq!(report.fetch_error.as_deref(), Some("HTTP 401: unauthorized"));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn filters_apply_before_dispatch() {
        let records = vec![
            record(1, "41"),
            record(2, "42").with_field("amount", 50_i64),
        ];
        let store = Arc::new(FakeStore::with_records(records));
        let sender = Arc::new(FakeSender::default());
        let ctl = controller(&store, &sender, false);
        let selector = RecordSelector::new(
            vec![FilterSpec::new(
                "amount",
                FilterOperator::parse("greater_than"),
                "100",
            )],
            FilterLogic::And,
            StatusFields::default(),
        );

        let report = ctl.run(&selector).await;
        assert_eq!(report.selection.fetched, 2);
        assert_eq!(report.selection.matched_filters, 1);
        assert_eq!(report.result.total, 1);
        assert_eq!(sender.sent()[0].0, "41");
    }

    #[tokio::test]
    async fn raw_fields_are_not_date_formatted() {
        let store = Arc::new(FakeStore::default());
        let sender = Arc::new(FakeSender::default());
        let mut settings = settings(false);
        settings.body_template = "Montant: {amount}".into();
        let ctl = DispatchController::new(store.clone(), sender.clone(), settings)
            .with_raw_fields(&["amount".to_string()]);

        ctl.process_record(&record(1, "42")).await.unwrap();
        assert_eq!(sender.sent()[0].3, "Montant: 120");
    }
}
