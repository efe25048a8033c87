//! Démarches Simplifiées GraphQL client: posts messages onto cases.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::clients::{MessageSender, SentMessage};
use crate::error::MessagingError;

const SEND_MESSAGE_MUTATION: &str = r#"
mutation dossierEnvoyerMessage($input: DossierEnvoyerMessageInput!) {
  dossierEnvoyerMessage(input: $input) {
    message {
      id
      email
      body
      createdAt
    }
    errors {
      message
    }
  }
}
"#;

/// Démarches Simplifiées API client, bearer-authenticated.
pub struct DemarchesClient {
    endpoint: String,
    token: SecretString,
    timeout: Duration,
    client: reqwest::Client,
}

impl DemarchesClient {
    pub fn new(
        endpoint: &str,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, MessagingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MessagingError::Request(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            token,
            timeout,
            client,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> MessagingError {
        if e.is_timeout() {
            MessagingError::Timeout(self.timeout)
        } else if e.is_connect() {
            MessagingError::Connect(e.to_string())
        } else {
            MessagingError::Request(e.to_string())
        }
    }
}

/// Message body as posted on the case: bold subject, blank line, body.
pub fn compose_body(subject: &str, body: &str) -> String {
    format!("**{subject}**\n\n{body}")
}

/// Collect `message` entries of a GraphQL `errors` array.
fn error_messages(errors: &Value) -> Vec<String> {
    errors
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Interpret a GraphQL response to the send-message mutation.
///
/// Both top-level `errors` and mutation-level `errors` are remote errors.
pub fn parse_send_response(response: &Value) -> Result<SentMessage, MessagingError> {
    let top_level = error_messages(response.get("errors").unwrap_or(&Value::Null));
    if !top_level.is_empty() {
        return Err(MessagingError::Remote(top_level));
    }

    let result = response
        .get("data")
        .and_then(|d| d.get("dossierEnvoyerMessage"))
        .filter(|r| r.is_object())
        .ok_or_else(|| {
            MessagingError::InvalidResponse("missing data.dossierEnvoyerMessage".to_string())
        })?;

    let mutation_errors = error_messages(result.get("errors").unwrap_or(&Value::Null));
    if !mutation_errors.is_empty() {
        return Err(MessagingError::Remote(mutation_errors));
    }

    let id = result
        .get("message")
        .and_then(|m| m.get("id"))
        .and_then(Value::as_str)
        .map(String::from);
    Ok(SentMessage { id })
}

#[async_trait]
impl MessageSender for DemarchesClient {
    async fn send_message(
        &self,
        case_id: &str,
        recipient_id: &str,
        subject: &str,
        body: &str,
    ) -> Result<SentMessage, MessagingError> {
        let payload = json!({
            "query": SEND_MESSAGE_MUTATION,
            "variables": {
                "input": {
                    "dossierId": case_id,
                    "instructeurId": recipient_id,
                    "body": compose_body(subject, body),
                }
            }
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.map_transport_error(e))?;
        if !status.is_success() {
            return Err(MessagingError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| MessagingError::InvalidResponse(e.to_string()))?;
        let sent = parse_send_response(&value)?;
        debug!(case_id = %case_id, message_id = ?sent.id, "Message posted");
        Ok(sent)
    }
}
