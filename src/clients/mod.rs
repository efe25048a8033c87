//! External collaborators: pure I/O, no business logic.
//!
//! The dispatch controller only talks to the outside world through
//! [`RecordStore`] and [`MessageSender`]. Concrete HTTP clients live in
//! the submodules; tests substitute in-memory fakes.

pub mod demarches;
pub mod grist;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{MessagingError, StoreError};
use crate::record::Record;

pub use demarches::DemarchesClient;
pub use grist::GristClient;

/// A table inside the tabular data store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub doc_id: String,
    pub table: String,
}

impl TableRef {
    pub fn new(doc_id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            table: table.into(),
        }
    }
}

/// Tabular data store holding the records and their delivery status.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch every record of a table.
    async fn get_records(&self, table: &TableRef) -> Result<Vec<Record>, StoreError>;

    /// Overwrite some fields of one record.
    async fn update_record(
        &self,
        table: &TableRef,
        record_id: i64,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;
}

/// Acknowledgement returned by the messaging API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentMessage {
    /// Remote message id, when the API returns one.
    pub id: Option<String>,
}

/// Case-management API that posts messages onto cases.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(
        &self,
        case_id: &str,
        recipient_id: &str,
        subject: &str,
        body: &str,
    ) -> Result<SentMessage, MessagingError>;
}
