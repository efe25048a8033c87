//! Grist REST client: records read and partial updates.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::clients::{RecordStore, TableRef};
use crate::error::StoreError;
use crate::record::Record;

/// Grist API client, bearer-authenticated.
pub struct GristClient {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    records: Vec<Record>,
}

impl GristClient {
    pub fn new(base_url: &str, token: SecretString, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn records_url(&self, table: &TableRef) -> String {
        format!(
            "{}/docs/{}/tables/{}/records",
            self.base_url, table.doc_id, table.table
        )
    }

    async fn check_status(resp: reqwest::Response) -> Result<String, StoreError> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Decode a `GET .../records` response body.
pub fn parse_records(body: &str) -> Result<Vec<Record>, StoreError> {
    serde_json::from_str::<RecordsResponse>(body)
        .map(|r| r.records)
        .map_err(|e| StoreError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl RecordStore for GristClient {
    async fn get_records(&self, table: &TableRef) -> Result<Vec<Record>, StoreError> {
        let resp = self
            .client
            .get(self.records_url(table))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let body = Self::check_status(resp).await?;
        let records = parse_records(&body)?;
        debug!(table = %table.table, count = records.len(), "Fetched Grist records");
        Ok(records)
    }

    async fn update_record(
        &self,
        table: &TableRef,
        record_id: i64,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let payload = json!({
            "records": [{ "id": record_id, "fields": fields }]
        });

        let resp = self
            .client
            .patch(self.records_url(table))
            .bearer_auth(self.token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        Self::check_status(resp).await?;
        Ok(())
    }
}
