//! NATS subscriber for submitted traffic records

use crate::types::record::RecordSubmission;
use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Consumer for receiving records from NATS
pub struct RecordConsumer {
    client: Client,
    subject: String,
}

impl RecordConsumer {
    /// Create a new record consumer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the record subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to record subject");
        Ok(subscriber)
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Decode a message payload into a record submission
pub fn decode_submission(payload: &[u8]) -> serde_json::Result<RecordSubmission> {
    serde_json::from_slice(payload)
}
